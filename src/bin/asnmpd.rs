//! asnmpd: demonstration agent daemon.
//!
//! Serves a small system subtree plus a demo table over UDP. Real agents
//! link the library and register their own instrumentation; this binary
//! exists to exercise the stack end to end.

use std::process::ExitCode;
use std::sync::Arc;
use std::time::Instant;

use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use async_snmpd::handler::{
    BoxFuture, HandlerAccess, HandlerChain, HandlerNode, HandlerResult, Mode, NextHandler,
    Request, RequestInfo,
};
use async_snmpd::registry::{Registration, RegistrationModes};
use async_snmpd::store::CoreConfig;
use async_snmpd::table::{
    self, Container, IndexTemplate, KeyType, Row, SortedRowContainer, TableInfo, container,
};
use async_snmpd::transport::UdpTransport;
use async_snmpd::value::ValueKind;
use async_snmpd::{Agent, Oid, Value, oid};

/// Demonstration SNMP agent.
#[derive(Debug, Parser)]
#[command(name = "asnmpd", version, about)]
struct Args {
    /// Listen address (domain-prefixed, e.g. udp:0.0.0.0:1161).
    #[arg(short, long, default_value = "udp:127.0.0.1:1161")]
    listen: String,

    /// Community string accepted by the agent.
    #[arg(short, long, default_value = "public")]
    community: String,

    /// Configuration file with core tokens (injectHandler, defDomain...).
    #[arg(long)]
    config: Option<std::path::PathBuf>,

    /// Increase log verbosity (repeatable; also honors RUST_LOG).
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

fn init_tracing(verbose: u8) {
    use tracing_subscriber::EnvFilter;
    let default = match verbose {
        0 => "async_snmpd=info",
        1 => "async_snmpd=debug",
        _ => "async_snmpd=trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

/// System group scalars: sysDescr.0, sysUpTime.0, sysName.0.
struct SystemGroup {
    started: Instant,
    name: String,
}

impl SystemGroup {
    const DESCR: [u32; 9] = [1, 3, 6, 1, 2, 1, 1, 1, 0];
    const UPTIME: [u32; 9] = [1, 3, 6, 1, 2, 1, 1, 3, 0];
    const NAME: [u32; 9] = [1, 3, 6, 1, 2, 1, 1, 5, 0];

    fn value_for(&self, oid: &Oid) -> Option<Value> {
        if oid.arcs() == Self::DESCR.as_slice() {
            return Some(Value::OctetString("async-snmpd demonstration agent".into()));
        }
        if oid.arcs() == Self::UPTIME.as_slice() {
            let ticks = (self.started.elapsed().as_millis() / 10) as u32;
            return Some(Value::TimeTicks(ticks));
        }
        if oid.arcs() == Self::NAME.as_slice() {
            return Some(Value::OctetString(self.name.clone().into()));
        }
        None
    }

    fn instances() -> [Oid; 3] {
        [
            Oid::from_arcs(&Self::DESCR),
            Oid::from_arcs(&Self::UPTIME),
            Oid::from_arcs(&Self::NAME),
        ]
    }
}

impl HandlerAccess for SystemGroup {
    fn access<'a>(
        &'a self,
        _node: &'a HandlerNode,
        _next: NextHandler<'a>,
        _reginfo: &'a Registration,
        reqinfo: &'a RequestInfo,
        requests: &'a mut [Request],
    ) -> BoxFuture<'a, HandlerResult> {
        Box::pin(async move {
            for request in requests.iter_mut() {
                match reqinfo.mode {
                    Mode::Get => match self.value_for(&request.varbind.oid) {
                        Some(value) => request.set_value(value),
                        None => request.set_value(Value::NoSuchInstance),
                    },
                    Mode::GetNext | Mode::GetBulk => {
                        let probe = request.varbind.oid.clone();
                        if let Some(instance) =
                            Self::instances().into_iter().find(|o| *o > probe)
                            && let Some(value) = self.value_for(&instance)
                        {
                            request.set_varbind(async_snmpd::VarBind::new(instance, value));
                        }
                    }
                    _ => {
                        request.set_error(async_snmpd::ErrorStatus::NotWritable);
                    }
                }
            }
            Ok(())
        })
    }
}

/// Demo table leaf: row payloads are (description, value) pairs; column 2
/// is the description, column 3 the value.
struct DemoTableLeaf;

type DemoRow = (String, i32);

impl HandlerAccess for DemoTableLeaf {
    fn access<'a>(
        &'a self,
        _node: &'a HandlerNode,
        _next: NextHandler<'a>,
        _reginfo: &'a Registration,
        reqinfo: &'a RequestInfo,
        requests: &'a mut [Request],
    ) -> BoxFuture<'a, HandlerResult> {
        Box::pin(async move {
            for request in requests.iter_mut() {
                if reqinfo.mode != Mode::Get {
                    continue;
                }
                let Some(info) = request
                    .data
                    .get::<table::TableRequestInfo>(table::TABLE_DATA_NAME)
                    .cloned()
                else {
                    continue;
                };
                let Some((descr, value)) = request
                    .data
                    .get::<Row>(container::ROW_DATA_NAME)
                    .and_then(|row| row.data.downcast_ref::<DemoRow>().cloned())
                else {
                    continue;
                };
                match info.column {
                    2 => request.set_value(Value::OctetString(descr.into())),
                    3 => request.set_value(Value::Integer(value)),
                    _ => request.set_value(Value::NoSuchInstance),
                }
            }
            Ok(())
        })
    }
}

fn demo_table_registration() -> Registration {
    let mut rows = SortedRowContainer::new();
    for (index, descr, value) in [(1u32, "alpha", 42i32), (3, "gamma", 99)] {
        rows.insert(Row::new(oid!(index), Arc::new((descr.to_string(), value))));
    }

    let info = TableInfo::new(vec![IndexTemplate::new(ValueKind::Integer)], 2, 3);
    let mut chain = HandlerChain::single(HandlerNode::new("demo_table_leaf", Arc::new(DemoTableLeaf)));
    chain.inject(table::table_container(
        container::shared(rows),
        KeyType::OidIndex,
    ));
    chain.inject(table::table(info));

    Registration::new("demoTable", oid!(1, 3, 6, 1, 4, 1, 8072, 9999, 1), chain)
        .with_modes(RegistrationModes::RONLY)
}

async fn run(args: Args) -> Result<(), (u8, async_snmpd::Error)> {
    let system = HandlerChain::single(HandlerNode::new(
        "system",
        Arc::new(SystemGroup {
            started: Instant::now(),
            name: "asnmpd".to_string(),
        }),
    ));
    let agent = Agent::builder()
        .community(args.community.into_bytes())
        .register(
            Registration::new("system", oid!(1, 3, 6, 1, 2, 1, 1), system)
                .with_modes(RegistrationModes::RONLY),
        )
        .map_err(|e| (1, e))?
        .register(demo_table_registration())
        .map_err(|e| (1, e))?
        .build();

    if let Some(path) = &args.config {
        let text = std::fs::read_to_string(path).map_err(|e| (1, e.into()))?;
        let mut config = CoreConfig::new();
        config.read_config(&text).map_err(|e| (1, e))?;
        config.apply_inject_handlers(&agent).map_err(|e| (1, e))?;
    }

    let transport = UdpTransport::bind_address(&args.listen)
        .await
        .map_err(|e| (1, e))?;
    info!(listen = %transport_local(&transport), "agent listening");

    let shutdown = CancellationToken::new();
    let signal_token = shutdown.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("shutdown requested");
            signal_token.cancel();
        }
    });

    agent.serve(transport, shutdown).await.map_err(|e| (2, e))
}

fn transport_local(transport: &UdpTransport) -> std::net::SocketAddr {
    use async_snmpd::transport::AgentTransport;
    transport.local_addr()
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    let args = Args::parse();
    init_tracing(args.verbose);

    match run(args).await {
        Ok(()) => ExitCode::SUCCESS,
        Err((code, error)) => {
            error!(%error, "agent exited");
            ExitCode::from(code)
        }
    }
}
