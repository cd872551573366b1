use std::fmt;

use crate::error::PgBridgeError;

/// Port assumed when an address omits `:port`.
pub const DEFAULT_PORT: u16 = 5432;

/// One remote server process. Immutable once parsed.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Endpoint {
    pub host: String,
    pub port: u16,
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

/// Replica endpoints considered interchangeable for read routing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Shard {
    pub replicas: Vec<Endpoint>,
}

/// Parsed topology of shards and their replica endpoints.
///
/// Grammar: a comma-separated list of shard specifications. Each shard is a
/// plain `host[:port]`, a `|`-separated list of replica endpoints, or a brace
/// expansion `prefix{a|b|c}suffix[:port]` producing one replica per
/// alternative:
/// ```rust
/// use pg_bridge::HostSet;
///
/// let set = HostSet::parse("node{1|2}.db:5432,node3:5433").unwrap();
/// assert_eq!(set.shards.len(), 2);
/// assert_eq!(set.shards[0].replicas.len(), 2);
/// assert_eq!(set.shards[0].replicas[0].host, "node1.db");
/// ```
///
/// Routing logic operates on this structure only; the original string is
/// never re-parsed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostSet {
    pub shards: Vec<Shard>,
}

impl HostSet {
    /// Parse a compact address list.
    ///
    /// # Errors
    /// Returns `AddressError` for an empty list, an empty shard or replica
    /// alternative, unbalanced braces, or a malformed port.
    pub fn parse(list: &str) -> Result<HostSet, PgBridgeError> {
        let err = |reason: String| PgBridgeError::AddressError {
            list: list.to_string(),
            reason,
        };

        if list.trim().is_empty() {
            return Err(err("no shards".to_string()));
        }

        let mut shards = Vec::new();
        for spec in list.split(',') {
            let spec = spec.trim();
            if spec.is_empty() {
                return Err(err("empty shard specification".to_string()));
            }
            let replicas = parse_shard(spec).map_err(err)?;
            shards.push(Shard { replicas });
        }

        Ok(HostSet { shards })
    }

    #[must_use]
    pub fn shard_count(&self) -> usize {
        self.shards.len()
    }
}

fn parse_shard(spec: &str) -> Result<Vec<Endpoint>, String> {
    let expanded = match spec.find('{') {
        Some(open) => {
            let close = spec
                .find('}')
                .filter(|close| *close > open)
                .ok_or_else(|| format!("unbalanced braces in '{spec}'"))?;
            let prefix = &spec[..open];
            let suffix = &spec[close + 1..];
            let mut replicas = Vec::new();
            for alt in spec[open + 1..close].split('|') {
                if alt.is_empty() {
                    return Err(format!("empty replica alternative in '{spec}'"));
                }
                replicas.push(format!("{prefix}{alt}{suffix}"));
            }
            replicas
        }
        None => spec.split('|').map(str::to_string).collect(),
    };

    let mut replicas = Vec::new();
    for address in expanded {
        if address.trim().is_empty() {
            return Err(format!("empty replica alternative in '{spec}'"));
        }
        replicas.push(parse_endpoint(address.trim())?);
    }
    Ok(replicas)
}

fn parse_endpoint(address: &str) -> Result<Endpoint, String> {
    match address.rsplit_once(':') {
        Some((host, port)) => {
            if host.is_empty() {
                return Err(format!("missing host in '{address}'"));
            }
            let port = port
                .parse::<u16>()
                .map_err(|_| format!("invalid port in '{address}'"))?;
            Ok(Endpoint {
                host: host.to_string(),
                port,
            })
        }
        None => Ok(Endpoint {
            host: address.to_string(),
            port: DEFAULT_PORT,
        }),
    }
}
