use crate::error::Error;

use std::path::PathBuf;

/// Closed set of supported transports, selected by the spec's scheme string.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scheme {
    /// Connectionless datagrams, one heartbeat per datagram.
    Udp,
    /// Stream socket, newline-framed heartbeats.
    Tcp,
    /// Filesystem-path stream socket, newline-framed heartbeats.
    Unix,
}

/// A parsed listener endpoint spec: `scheme://[host][:port][/path][?opt=value]`.
#[derive(Debug, Clone)]
pub struct Endpoint {
    /// The original spec string; doubles as the listener identifier carried
    /// in `received_via` and in `error` events.
    pub spec: String,
    pub scheme: Scheme,
    /// `host:port`, present for udp/tcp.
    pub addr: Option<String>,
    /// Socket file path, present for unix.
    pub path: Option<PathBuf>,
    /// Octal permission bits applied to the socket file after binding.
    pub mode: Option<u32>,
}

impl Endpoint {
    pub fn parse(spec: &str) -> Result<Self, Error> {
        let parsed = url::Url::parse(spec)
            .map_err(|e| Error::configuration(spec, e.to_string()))?;

        let scheme = match parsed.scheme() {
            "udp" => Scheme::Udp,
            "tcp" => Scheme::Tcp,
            "unix" => Scheme::Unix,
            other => {
                return Err(Error::configuration(
                    spec,
                    format!("unsupported scheme `{}`", other),
                ));
            }
        };

        match scheme {
            Scheme::Udp | Scheme::Tcp => {
                let host = parsed
                    .host_str()
                    .ok_or_else(|| Error::configuration(spec, "host required"))?;
                let port = parsed
                    .port()
                    .ok_or_else(|| Error::configuration(spec, "port required"))?;

                Ok(Self {
                    spec: spec.to_string(),
                    scheme,
                    addr: Some(format!("{}:{}", host, port)),
                    path: None,
                    mode: None,
                })
            }
            Scheme::Unix => {
                let path = parsed.path();
                if path.is_empty() || path == "/" {
                    return Err(Error::configuration(spec, "socket path required"));
                }

                let mode = match parsed.query_pairs().find(|(key, _)| key == "mode") {
                    Some((_, value)) => {
                        let mode = u32::from_str_radix(&value, 8).map_err(|_| {
                            Error::configuration(spec, "mode must be octal digits")
                        })?;
                        if mode > 0o777 {
                            return Err(Error::configuration(spec, "mode out of range"));
                        }
                        Some(mode)
                    }
                    None => None,
                };

                Ok(Self {
                    spec: spec.to_string(),
                    scheme,
                    addr: None,
                    path: Some(PathBuf::from(path)),
                    mode,
                })
            }
        }
    }
}
