use std::path::Path;

use serde_yaml::{Mapping, Value};

use crate::Error;

/// Service of the fallback rule cloudflared requires at the end of `ingress`.
pub const CATCH_ALL_SERVICE: &str = "http_status:404";

const INGRESS_KEY: &str = "ingress";

/// Surfaces to callers only as the message inside [`Error::Parse`].
#[derive(thiserror::Error, Debug)]
#[error("invalid ingress rule: {0}")]
pub struct InvalidRule(String);

/// Rule shape as it appears on disk, before the hostname/service checks.
#[derive(serde::Serialize, serde::Deserialize)]
pub struct UnvalidatedIngressRule {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    hostname: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    path: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    service: Option<String>,
    #[serde(flatten)]
    extra: Mapping,
}

/// A rule routing one hostname to a service.
#[derive(Clone, Debug, PartialEq)]
pub struct Route {
    pub hostname: String,
    pub path: Option<String>,
    pub service: String,
    /// Keys this tool doesn't interpret, e.g. `originRequest`.
    pub extra: Mapping,
}

/// A rule without a hostname. Matches every request that reaches it.
#[derive(Clone, Debug, PartialEq)]
pub struct CatchAll {
    pub path: Option<String>,
    pub service: String,
    pub extra: Mapping,
}

#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(try_from = "UnvalidatedIngressRule", into = "UnvalidatedIngressRule")]
pub enum IngressRule {
    Route(Route),
    CatchAll(CatchAll),
}

impl IngressRule {
    pub fn route(hostname: &str, service: &str) -> Self {
        IngressRule::Route(Route {
            hostname: hostname.to_owned(),
            path: None,
            service: service.to_owned(),
            extra: Mapping::new(),
        })
    }

    /// The `{service: http_status:404}` fallback.
    pub fn catch_all() -> Self {
        IngressRule::CatchAll(CatchAll {
            path: None,
            service: CATCH_ALL_SERVICE.to_owned(),
            extra: Mapping::new(),
        })
    }

    pub fn hostname(&self) -> Option<&str> {
        match self {
            IngressRule::Route(route) => Some(&route.hostname),
            IngressRule::CatchAll(_) => None,
        }
    }

    pub fn service(&self) -> &str {
        match self {
            IngressRule::Route(route) => &route.service,
            IngressRule::CatchAll(catch_all) => &catch_all.service,
        }
    }
}

impl TryFrom<UnvalidatedIngressRule> for IngressRule {
    type Error = InvalidRule;

    fn try_from(rule: UnvalidatedIngressRule) -> Result<Self, Self::Error> {
        let UnvalidatedIngressRule {
            hostname,
            path,
            service,
            extra,
        } = rule;

        let Some(service) = service else {
            return Err(InvalidRule(match hostname {
                Some(hostname) => format!("rule for {hostname} has no service"),
                None => "catch-all rule has no service".to_owned(),
            }));
        };

        Ok(match hostname {
            Some(hostname) => IngressRule::Route(Route {
                hostname,
                path,
                service,
                extra,
            }),
            None => IngressRule::CatchAll(CatchAll {
                path,
                service,
                extra,
            }),
        })
    }
}

impl From<IngressRule> for UnvalidatedIngressRule {
    fn from(rule: IngressRule) -> Self {
        match rule {
            IngressRule::Route(Route {
                hostname,
                path,
                service,
                extra,
            }) => UnvalidatedIngressRule {
                hostname: Some(hostname),
                path,
                service: Some(service),
                extra,
            },
            IngressRule::CatchAll(CatchAll {
                path,
                service,
                extra,
            }) => UnvalidatedIngressRule {
                hostname: None,
                path,
                service: Some(service),
                extra,
            },
        }
    }
}

/// A cloudflared config file.
///
/// Only `ingress` is interpreted. Every other top-level key (`tunnel`,
/// `credentials-file`, `warp-routing`, ...) is carried through untouched and
/// keeps its position in the document.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct LocalConfig {
    // Still holds the original `ingress` value, which pins the key's position.
    settings: Mapping,
    ingress: Vec<IngressRule>,
}

impl LocalConfig {
    pub fn from_yaml_str(contents: &str) -> Result<Self, Error> {
        Self::parse(Path::new("<inline>"), contents)
    }

    /// Parses `contents`, attributing errors to `path`.
    ///
    /// Blank, comment-only or `null` documents are treated as an empty config.
    pub fn parse(path: &Path, contents: &str) -> Result<Self, Error> {
        let parse_error = |source| Error::Parse {
            path: path.to_path_buf(),
            source,
        };

        if contents
            .lines()
            .map(str::trim)
            .all(|line| line.is_empty() || line.starts_with('#'))
        {
            return Ok(Self::default());
        }

        let settings = match serde_yaml::from_str::<Value>(contents).map_err(parse_error)? {
            Value::Null => return Ok(Self::default()),
            Value::Mapping(settings) => settings,
            _ => {
                return Err(Error::NotAMapping {
                    path: path.to_path_buf(),
                })
            }
        };

        let ingress = match settings.get(INGRESS_KEY) {
            None | Some(Value::Null) => Vec::new(),
            Some(value) => serde_yaml::from_value(value.clone()).map_err(parse_error)?,
        };

        Ok(LocalConfig { settings, ingress })
    }

    pub fn to_yaml_string(&self) -> Result<String, Error> {
        let mut document = self.settings.clone();
        document.insert(
            Value::String(INGRESS_KEY.to_owned()),
            serde_yaml::to_value(&self.ingress)?,
        );
        Ok(serde_yaml::to_string(&document)?)
    }

    pub fn rules(&self) -> &[IngressRule] {
        &self.ingress
    }

    /// Replaces every rule for `hostname` with a single route placed first.
    pub fn upsert(&mut self, hostname: &str, service: &str) {
        self.remove(hostname);
        self.ingress.insert(0, IngressRule::route(hostname, service));
    }

    /// Drops every rule for `hostname`, returning how many were removed.
    pub fn remove(&mut self, hostname: &str) -> usize {
        let before = self.ingress.len();
        self.ingress.retain(|rule| rule.hostname() != Some(hostname));
        before - self.ingress.len()
    }

    /// Leaves exactly one `http_status:404` rule, at the end.
    ///
    /// Any rule whose service is `http_status:404` is dropped first, named or not.
    pub fn normalize(&mut self) {
        self.ingress.retain(|rule| rule.service() != CATCH_ALL_SERVICE);
        self.ingress.push(IngressRule::catch_all());
    }
}
