//! Dispatch conformance: registration shadowing, table walks, the SET
//! phase machine, and the UDP serve loop end to end.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use bytes::Bytes;
use tokio_util::sync::CancellationToken;

use async_snmpd::handler::{
    BoxFuture, HandlerAccess, HandlerChain, HandlerNode, HandlerResult, Mode, NextHandler,
    Request, RequestContext, RequestInfo,
};
use async_snmpd::registry::{Registration, RegistrationModes};
use async_snmpd::table::{
    self, Container, IndexTemplate, KeyType, Row, SortedRowContainer, TableInfo, container,
};
use async_snmpd::transport::UdpTransport;
use async_snmpd::value::ValueKind;
use async_snmpd::{Agent, ErrorStatus, Message, Oid, Pdu, PduType, Value, VarBind, Version, oid};

/// Answers every GET with a fixed integer; used to tell which
/// registration served a request.
struct Tagged(i32);

impl HandlerAccess for Tagged {
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
                if reqinfo.mode == Mode::Get {
                    request.set_value(Value::Integer(self.0));
                }
            }
            Ok(())
        })
    }
}

fn tagged_registration(name: &str, root: Oid, priority: i32, tag: i32) -> Registration {
    let chain = HandlerChain::single(HandlerNode::new(name, Arc::new(Tagged(tag))));
    Registration::new(name, root, chain).with_priority(priority)
}

/// Two registrations share a root: priority 10 and priority 5. The lower
/// priority answers until it is unregistered, then the other takes over.
#[tokio::test]
async fn priority_shadowing() {
    let root = oid!(1, 3, 6, 1, 4, 1, 4242);
    let agent = Agent::builder()
        .register(tagged_registration("h1", root.clone(), 10, 1))
        .unwrap()
        .register(tagged_registration("h2", root.clone(), 5, 2))
        .unwrap()
        .build();

    let pdu = Pdu::request(PduType::Get, 1, vec![VarBind::null(root.clone())]);
    let response = agent.handle_pdu(&pdu, RequestContext::default()).await;
    assert_eq!(response.varbinds[0].value, Value::Integer(2));

    agent.unregister("", &root, 5).unwrap();
    let response = agent.handle_pdu(&pdu, RequestContext::default()).await;
    assert_eq!(response.varbinds[0].value, Value::Integer(1));
}

/// Leaf for the integer-indexed demo table: column 1 carries the row
/// payload value.
struct TableLeaf;

impl HandlerAccess for TableLeaf {
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
                let value = request
                    .data
                    .get::<Row>(container::ROW_DATA_NAME)
                    .and_then(|row| row.data.downcast_ref::<i32>().copied());
                if info.column == 1
                    && let Some(value) = value
                {
                    request.set_value(Value::Integer(value));
                }
            }
            Ok(())
        })
    }
}

fn table_agent(root: Oid) -> Agent {
    let mut rows = SortedRowContainer::new();
    rows.insert(Row::new(oid!(1), Arc::new(42i32)));
    rows.insert(Row::new(oid!(3), Arc::new(99i32)));

    let info = TableInfo::new(vec![IndexTemplate::new(ValueKind::Integer)], 1, 1);
    let mut chain = HandlerChain::single(HandlerNode::new("leaf", Arc::new(TableLeaf)));
    chain.inject(table::table_container(
        container::shared(rows),
        KeyType::OidIndex,
    ));
    chain.inject(table::table(info));

    Agent::builder()
        .register(Registration::new("testTable", root, chain))
        .unwrap()
        .build()
}

/// Rows {1 -> 42, 3 -> 99}; GETNEXT between the rows lands
/// on row 3.
#[tokio::test]
async fn table_getnext_skips_to_next_row() {
    let root = oid!(1, 3, 6, 1, 4, 1, 777, 1);
    let agent = table_agent(root.clone());

    // GETNEXT on column 1, index 2: next is row 3
    let probe = root.extend(1).extend(2);
    let pdu = Pdu::request(PduType::GetNext, 1, vec![VarBind::null(probe)]);
    let response = agent.handle_pdu(&pdu, RequestContext::default()).await;
    assert_eq!(response.error_status, 0);
    assert_eq!(response.varbinds[0].oid, root.extend(1).extend(3));
    assert_eq!(response.varbinds[0].value, Value::Integer(99));
}

#[tokio::test]
async fn table_walk_visits_all_rows() {
    let root = oid!(1, 3, 6, 1, 4, 1, 777, 1);
    let agent = table_agent(root.clone());

    let mut cursor = root.clone();
    let mut seen = Vec::new();
    loop {
        let pdu = Pdu::request(PduType::GetNext, 1, vec![VarBind::null(cursor.clone())]);
        let response = agent.handle_pdu(&pdu, RequestContext::default()).await;
        let vb = &response.varbinds[0];
        if vb.value == Value::EndOfMibView {
            break;
        }
        seen.push((vb.oid.clone(), vb.value.clone()));
        cursor = vb.oid.clone();
    }

    assert_eq!(
        seen,
        vec![
            (root.extend(1).extend(1), Value::Integer(42)),
            (root.extend(1).extend(3), Value::Integer(99)),
        ]
    );
}

#[tokio::test]
async fn table_get_exact_and_missing() {
    let root = oid!(1, 3, 6, 1, 4, 1, 777, 1);
    let agent = table_agent(root.clone());

    let pdu = Pdu::request(
        PduType::Get,
        1,
        vec![
            VarBind::null(root.extend(1).extend(3)),
            VarBind::null(root.extend(1).extend(2)),
            VarBind::null(root.extend(9).extend(1)),
        ],
    );
    let response = agent.handle_pdu(&pdu, RequestContext::default()).await;
    assert_eq!(response.varbinds[0].value, Value::Integer(99));
    assert_eq!(response.varbinds[1].value, Value::NoSuchInstance);
    assert_eq!(response.varbinds[2].value, Value::NoSuchObject);
}

/// Records (variable tail, phase) pairs across a SET transaction.
struct SetRecorder {
    log: Arc<Mutex<Vec<(u32, Mode)>>>,
    fail: Option<(u32, Mode, ErrorStatus)>,
}

impl HandlerAccess for SetRecorder {
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
                let tail = *request.varbind.oid.arcs().last().unwrap_or(&0);
                self.log.lock().unwrap().push((tail, reqinfo.mode));
                if let Some((fail_tail, fail_mode, status)) = self.fail
                    && tail == fail_tail
                    && reqinfo.mode == fail_mode
                {
                    request.set_error(status);
                }
            }
            Ok(())
        })
    }
}

/// Two variables, the second fails RESERVE2. The trace must be
/// both RESERVE1, both RESERVE2, both FREE; no ACTION; no COMMIT; status
/// resourceUnavailable at index 2.
#[tokio::test]
async fn set_reserve2_failure_trace() {
    let root = oid!(1, 3, 6, 1, 4, 1, 55);
    let log = Arc::new(Mutex::new(Vec::new()));
    let chain = HandlerChain::single(HandlerNode::new(
        "recorder",
        Arc::new(SetRecorder {
            log: Arc::clone(&log),
            fail: Some((2, Mode::SetReserve2, ErrorStatus::ResourceUnavailable)),
        }),
    ));
    let agent = Agent::builder()
        .register(Registration::new("recorder", root.clone(), chain))
        .unwrap()
        .build();

    let pdu = Pdu::request(
        PduType::Set,
        5,
        vec![
            VarBind::new(root.extend(1), Value::Integer(10)),
            VarBind::new(root.extend(2), Value::Integer(20)),
        ],
    );
    let response = agent.handle_pdu(&pdu, RequestContext::default()).await;
    assert_eq!(response.status(), ErrorStatus::ResourceUnavailable);
    assert_eq!(response.error_index, 2);

    let log = log.lock().unwrap();
    assert_eq!(
        log.as_slice(),
        &[
            (1, Mode::SetReserve1),
            (2, Mode::SetReserve1),
            (1, Mode::SetReserve2),
            (2, Mode::SetReserve2),
            (1, Mode::SetFree),
            (2, Mode::SetFree),
        ]
    );
}

/// SET atomicity: a commit failure rolls back the committed prefix with
/// exactly one UNDO per variable.
#[tokio::test]
async fn set_commit_failure_undo_once() {
    let root = oid!(1, 3, 6, 1, 4, 1, 56);
    let log = Arc::new(Mutex::new(Vec::new()));
    let chain = HandlerChain::single(HandlerNode::new(
        "recorder",
        Arc::new(SetRecorder {
            log: Arc::clone(&log),
            fail: Some((2, Mode::SetCommit, ErrorStatus::CommitFailed)),
        }),
    ));
    let agent = Agent::builder()
        .register(Registration::new("recorder", root.clone(), chain))
        .unwrap()
        .build();

    let pdu = Pdu::request(
        PduType::Set,
        6,
        vec![
            VarBind::new(root.extend(1), Value::Integer(10)),
            VarBind::new(root.extend(2), Value::Integer(20)),
        ],
    );
    let response = agent.handle_pdu(&pdu, RequestContext::default()).await;
    assert_eq!(response.status(), ErrorStatus::CommitFailed);

    let log = log.lock().unwrap();
    let undos_var1 = log
        .iter()
        .filter(|(t, m)| *t == 1 && *m == Mode::SetUndo)
        .count();
    assert_eq!(undos_var1, 1);
}

/// A writable scalar holding one integer, with full reserve semantics.
struct WritableScalar {
    stored: Arc<Mutex<i32>>,
    undo: Arc<Mutex<Option<i32>>>,
}

impl HandlerAccess for WritableScalar {
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
                    Mode::Get => {
                        request.set_value(Value::Integer(*self.stored.lock().unwrap()));
                    }
                    Mode::SetReserve1 => {
                        if request.varbind.value.check_type(ValueKind::Integer).is_err() {
                            request.set_error(ErrorStatus::WrongType);
                        }
                    }
                    Mode::SetAction => {
                        if let Value::Integer(new) = request.varbind.value {
                            let mut stored = self.stored.lock().unwrap();
                            *self.undo.lock().unwrap() = Some(*stored);
                            *stored = new;
                        }
                    }
                    Mode::SetUndo => {
                        if let Some(previous) = self.undo.lock().unwrap().take() {
                            *self.stored.lock().unwrap() = previous;
                        }
                    }
                    _ => {}
                }
            }
            Ok(())
        })
    }
}

#[tokio::test]
async fn writable_scalar_set_then_get() {
    let root = oid!(1, 3, 6, 1, 4, 1, 57, 1, 0);
    let stored = Arc::new(Mutex::new(5));
    let agent = Agent::builder()
        .scalar(
            "knob",
            root.clone(),
            Arc::new(WritableScalar {
                stored: Arc::clone(&stored),
                undo: Arc::new(Mutex::new(None)),
            }),
        )
        .unwrap()
        .build();

    let set = Pdu::request(
        PduType::Set,
        8,
        vec![VarBind::new(root.clone(), Value::Integer(11))],
    );
    let response = agent.handle_pdu(&set, RequestContext::default()).await;
    assert_eq!(response.status(), ErrorStatus::NoError);
    assert_eq!(*stored.lock().unwrap(), 11);

    let get = Pdu::request(PduType::Get, 9, vec![VarBind::null(root.clone())]);
    let response = agent.handle_pdu(&get, RequestContext::default()).await;
    assert_eq!(response.varbinds[0].value, Value::Integer(11));

    // Wrong type is caught in RESERVE1 and nothing changes
    let bad = Pdu::request(
        PduType::Set,
        10,
        vec![VarBind::new(root.clone(), Value::OctetString("x".into()))],
    );
    let response = agent.handle_pdu(&bad, RequestContext::default()).await;
    assert_eq!(response.status(), ErrorStatus::WrongType);
    assert_eq!(*stored.lock().unwrap(), 11);
}

/// End to end over real UDP: frame in, frame out.
#[tokio::test]
async fn udp_serve_roundtrip() {
    let root = oid!(1, 3, 6, 1, 4, 1, 4242);
    let agent = Agent::builder()
        .community(&b"public"[..])
        .register(tagged_registration("h", root.clone(), 10, 77))
        .unwrap()
        .build();

    let server = UdpTransport::bind("127.0.0.1:0".parse().unwrap()).await.unwrap();
    let server_addr = {
        use async_snmpd::transport::AgentTransport;
        server.local_addr()
    };

    let shutdown = CancellationToken::new();
    let serve_agent = agent.clone();
    let serve_shutdown = shutdown.clone();
    let server_task =
        tokio::spawn(async move { serve_agent.serve(server, serve_shutdown).await });

    let request = Message::new(
        Version::V2c,
        Bytes::from_static(b"public"),
        Pdu::request(PduType::Get, 1234, vec![VarBind::null(root.clone())]),
    );

    let client = tokio::net::UdpSocket::bind("127.0.0.1:0").await.unwrap();
    client
        .send_to(&request.encode(), server_addr)
        .await
        .unwrap();

    let mut buf = [0u8; 1500];
    let (len, _) = tokio::time::timeout(Duration::from_secs(5), client.recv_from(&mut buf))
        .await
        .unwrap()
        .unwrap();

    let response = Message::decode(Bytes::copy_from_slice(&buf[..len])).unwrap();
    assert_eq!(response.pdu.pdu_type, PduType::Response);
    assert_eq!(response.pdu.request_id, 1234);
    assert_eq!(response.pdu.varbinds[0].value, Value::Integer(77));

    shutdown.cancel();
    let _ = tokio::time::timeout(Duration::from_secs(5), server_task).await;
}

/// GETBULK over a table: non-repeater plus bounded repetitions.
#[tokio::test]
async fn getbulk_table_and_scalar() {
    let table_root = oid!(1, 3, 6, 1, 4, 1, 777, 1);
    let scalar_root = oid!(1, 3, 6, 1, 4, 1, 100);
    let mut rows = SortedRowContainer::new();
    rows.insert(Row::new(oid!(1), Arc::new(42i32)));
    rows.insert(Row::new(oid!(3), Arc::new(99i32)));

    let info = TableInfo::new(vec![IndexTemplate::new(ValueKind::Integer)], 1, 1);
    let mut chain = HandlerChain::single(HandlerNode::new("leaf", Arc::new(TableLeaf)));
    chain.inject(table::table_container(
        container::shared(rows),
        KeyType::OidIndex,
    ));
    chain.inject(table::table(info));

    let agent = Agent::builder()
        .register(Registration::new("testTable", table_root.clone(), chain))
        .unwrap()
        .scalar("s", scalar_root.extend(0), Arc::new(Tagged(7)))
        .unwrap()
        .build();

    // One non-repeater (the scalar), one repeater (the table), 3 reps
    let pdu = Pdu::get_bulk(
        2,
        1,
        3,
        vec![
            VarBind::null(scalar_root.clone()),
            VarBind::null(table_root.clone()),
        ],
    );
    let response = agent.handle_pdu(&pdu, RequestContext::default()).await;
    assert_eq!(response.error_status, 0);

    assert_eq!(response.varbinds[0].oid, scalar_root.extend(0));
    assert_eq!(response.varbinds[0].value, Value::Integer(7));

    assert_eq!(response.varbinds[1].value, Value::Integer(42));
    assert_eq!(response.varbinds[2].value, Value::Integer(99));
    assert_eq!(response.varbinds[3].value, Value::EndOfMibView);
}

/// RONLY registrations refuse SET at lookup time.
#[tokio::test]
async fn readonly_registration_not_writable() {
    let root = oid!(1, 3, 6, 1, 4, 1, 58);
    let chain = HandlerChain::single(HandlerNode::new("ro", Arc::new(Tagged(1))));
    let agent = Agent::builder()
        .register(
            Registration::new("ro", root.clone(), chain).with_modes(RegistrationModes::RONLY),
        )
        .unwrap()
        .build();

    let pdu = Pdu::request(
        PduType::Set,
        3,
        vec![VarBind::new(root.extend(1), Value::Integer(1))],
    );
    let response = agent.handle_pdu(&pdu, RequestContext::default()).await;
    assert_eq!(response.status(), ErrorStatus::NotWritable);
    assert_eq!(response.error_index, 1);
}
