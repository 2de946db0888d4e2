//! Persistent store and configuration tokens.
//!
//! Two related facilities live here:
//!
//! - [`PersistentStore`]: a registry of `(type, token)` entries with save
//!   and read callbacks. On demand the store renders every entry to lines
//!   (`token rest-of-line`) and dispatches matching lines back on startup.
//!   Tokens are case-sensitive.
//! - [`CoreConfig`]: the configuration tokens the core itself registers:
//!   `injectHandler NAME INTONAME [BEFORE_OTHER_NAME]`,
//!   `defDomain APPLICATION DOMAIN...`, and
//!   `defTarget APPLICATION DOMAIN TARGET`.

use std::collections::HashMap;

use tracing::{debug, warn};

use crate::agent::Agent;
use crate::error::{Error, Result};
use crate::handler::{HandlerNode, bulk_to_next, debug as debug_node};

/// Renders the lines an entry wants persisted.
pub type SaveFn = Box<dyn Fn() -> Vec<String> + Send + Sync>;
/// Consumes one matching persisted line (the token is stripped).
pub type ReadFn = Box<dyn FnMut(&str) -> Result<()> + Send>;

struct StoreEntry {
    type_name: String,
    token: String,
    save: SaveFn,
    read: ReadFn,
}

/// Token registry for persistent state.
#[derive(Default)]
pub struct PersistentStore {
    entries: Vec<StoreEntry>,
}

impl PersistentStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a `(type, token)` pair with its callbacks.
    pub fn register(
        &mut self,
        type_name: impl Into<String>,
        token: impl Into<String>,
        save: SaveFn,
        read: ReadFn,
    ) {
        self.entries.push(StoreEntry {
            type_name: type_name.into(),
            token: token.into(),
            save,
            read,
        });
    }

    /// Drop every entry registered under `type_name`.
    pub fn unregister_type(&mut self, type_name: &str) {
        self.entries.retain(|e| e.type_name != type_name);
    }

    /// Render all entries to persisted lines.
    pub fn save(&self) -> String {
        let mut out = String::new();
        for entry in &self.entries {
            for line in (entry.save)() {
                out.push_str(&entry.token);
                out.push(' ');
                out.push_str(&line);
                out.push('\n');
            }
        }
        out
    }

    /// Dispatch persisted lines back to their entries.
    ///
    /// Blank lines and `#` comments are skipped; a line whose token has no
    /// registered reader is logged and ignored.
    pub fn read(&mut self, input: &str) -> Result<()> {
        for (n, raw) in input.lines().enumerate() {
            let line = raw.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let (token, rest) = match line.split_once(char::is_whitespace) {
                Some((token, rest)) => (token, rest.trim_start()),
                None => (line, ""),
            };
            let mut handled = false;
            for entry in &mut self.entries {
                if entry.token == token {
                    (entry.read)(rest).map_err(|error| Error::Config {
                        line: n + 1,
                        message: error.to_string().into(),
                    })?;
                    handled = true;
                }
            }
            if !handled {
                debug!(token, line = n + 1, "no reader for persisted token");
            }
        }
        Ok(())
    }
}

/// One `injectHandler` directive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InjectHandler {
    /// Name of the stock node to create.
    pub handler: String,
    /// Name of the registration whose chain receives it.
    pub into: String,
    /// Splice before this named node; head of the chain when absent.
    pub before: Option<String>,
}

/// Parsed core configuration tokens.
#[derive(Debug, Default)]
pub struct CoreConfig {
    /// `injectHandler` directives, in file order.
    pub inject_handlers: Vec<InjectHandler>,
    /// `defDomain`: application name to ordered domain list.
    pub default_domains: HashMap<String, Vec<String>>,
    /// `defTarget`: (application, domain) to target address.
    pub default_targets: HashMap<(String, String), String>,
    /// `alias`: name to transport address (possibly another alias).
    pub aliases: HashMap<String, String>,
}

impl CoreConfig {
    /// Create an empty configuration.
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse a whole configuration text. Unknown tokens are skipped with a
    /// warning so application tokens can coexist in the same file.
    pub fn read_config(&mut self, input: &str) -> Result<()> {
        for (n, raw) in input.lines().enumerate() {
            let line = raw.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            self.parse_line(n + 1, line)?;
        }
        Ok(())
    }

    /// Parse one configuration line (without comment handling).
    pub fn parse_line(&mut self, line_number: usize, line: &str) -> Result<()> {
        let mut words = line.split_whitespace();
        let Some(token) = words.next() else {
            return Ok(());
        };
        let config_error = |message: &str| Error::Config {
            line: line_number,
            message: message.into(),
        };
        match token {
            "injectHandler" => {
                let handler = words
                    .next()
                    .ok_or_else(|| config_error("injectHandler needs a handler name"))?;
                let into = words
                    .next()
                    .ok_or_else(|| config_error("injectHandler needs a registration name"))?;
                let before = words.next().map(str::to_string);
                if words.next().is_some() {
                    return Err(config_error("injectHandler takes at most three arguments"));
                }
                self.inject_handlers.push(InjectHandler {
                    handler: handler.to_string(),
                    into: into.to_string(),
                    before,
                });
            }
            "defDomain" => {
                let application = words
                    .next()
                    .ok_or_else(|| config_error("defDomain needs an application"))?;
                let domains: Vec<String> = words.map(str::to_string).collect();
                if domains.is_empty() {
                    return Err(config_error("defDomain needs at least one domain"));
                }
                self.default_domains.insert(application.to_string(), domains);
            }
            "defTarget" => {
                let application = words
                    .next()
                    .ok_or_else(|| config_error("defTarget needs an application"))?;
                let domain = words
                    .next()
                    .ok_or_else(|| config_error("defTarget needs a domain"))?;
                let target = words
                    .next()
                    .ok_or_else(|| config_error("defTarget needs a target"))?;
                if words.next().is_some() {
                    return Err(config_error("defTarget takes three arguments"));
                }
                self.default_targets.insert(
                    (application.to_string(), domain.to_string()),
                    target.to_string(),
                );
            }
            "alias" => {
                let name = words
                    .next()
                    .ok_or_else(|| config_error("alias needs a name"))?;
                let target = words
                    .next()
                    .ok_or_else(|| config_error("alias needs a transport address"))?;
                if words.next().is_some() {
                    return Err(config_error("alias takes two arguments"));
                }
                self.aliases
                    .insert(name.to_string(), target.to_string());
            }
            other => {
                warn!(token = other, line = line_number, "unrecognized config token");
            }
        }
        Ok(())
    }

    /// The configured domains for an application.
    pub fn default_domain(&self, application: &str) -> Option<&[String]> {
        self.default_domains.get(application).map(Vec::as_slice)
    }

    /// The configured target for an application and domain.
    pub fn default_target(&self, application: &str, domain: &str) -> Option<&str> {
        self.default_targets
            .get(&(application.to_string(), domain.to_string()))
            .map(String::as_str)
    }

    /// The configured address for an alias name.
    pub fn alias(&self, name: &str) -> Option<&str> {
        self.aliases.get(name).map(String::as_str)
    }

    /// Apply every `injectHandler` directive to the agent.
    pub fn apply_inject_handlers(&self, agent: &Agent) -> Result<()> {
        for directive in &self.inject_handlers {
            let Some(node) = stock_node(&directive.handler) else {
                warn!(handler = %directive.handler, "unknown handler name in injectHandler");
                continue;
            };
            agent.inject_handler(node, &directive.into, directive.before.as_deref())?;
        }
        Ok(())
    }
}

/// Create a stock helper node by name.
pub fn stock_node(name: &str) -> Option<HandlerNode> {
    match name {
        "debug" => Some(debug_node()),
        "bulk_to_next" => Some(bulk_to_next()),
        _ => None,
    }
}
