//! Listener lifecycle.
//!
//! ```text
//!  Stopped ──start()──▶ Starting ──bind ok──▶ Running ──stop()──▶ Stopping ──▶ Stopped
//!                          └──bind failed──────────────────────────────────────▶┘
//! ```
//!
//! [`ListenerManager`] owns at most one running server. `start` and `stop`
//! are serialized; the current state can be read at any time without
//! waiting on either.

use std::fmt;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};

use axum::Router;
use thiserror::Error;
use tokio::net::TcpListener;
use tokio::sync::{oneshot, watch, Mutex};
use tokio::task::JoinHandle;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListenerState {
    Stopped,
    Starting,
    Running,
    Stopping,
}

impl fmt::Display for ListenerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ListenerState::Stopped => "stopped",
            ListenerState::Starting => "starting",
            ListenerState::Running => "running",
            ListenerState::Stopping => "stopping",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Error)]
pub enum ListenerError {
    #[error("invalid port {input:?}: expected a whole number between 1 and 65535")]
    Validation { input: String },
    #[error("listener is already {0}")]
    AlreadyRunning(ListenerState),
    #[error("failed to bind 0.0.0.0:{port}")]
    Bind {
        port: u16,
        #[source]
        source: std::io::Error,
    },
    #[error("listener task failed: {0}")]
    Task(String),
}

struct Running {
    shutdown: oneshot::Sender<()>,
    task: JoinHandle<std::io::Result<()>>,
    local_addr: SocketAddr,
}

/// Starts and stops the capture server on demand.
pub struct ListenerManager {
    app: Router,
    running: Mutex<Option<Running>>,
    state: watch::Sender<ListenerState>,
}

impl ListenerManager {
    pub fn new(app: Router) -> Self {
        let (state, _) = watch::channel(ListenerState::Stopped);
        Self {
            app,
            running: Mutex::new(None),
            state,
        }
    }

    pub fn state(&self) -> ListenerState {
        *self.state.borrow()
    }

    /// Follow state transitions.
    pub fn watch(&self) -> watch::Receiver<ListenerState> {
        self.state.subscribe()
    }

    /// Address the server is bound to, while running.
    pub async fn local_addr(&self) -> Option<SocketAddr> {
        self.running.lock().await.as_ref().map(|r| r.local_addr)
    }

    /// Bind `0.0.0.0:<port_input>` and start serving.
    ///
    /// Returns the URL clients on the local network should post to.
    pub async fn start(&self, port_input: &str) -> Result<String, ListenerError> {
        let mut running = self.running.lock().await;

        let current = self.state();
        if current != ListenerState::Stopped {
            return Err(ListenerError::AlreadyRunning(current));
        }
        let port = parse_port(port_input)?;

        self.state.send_replace(ListenerState::Starting);
        let listener = match TcpListener::bind((Ipv4Addr::UNSPECIFIED, port)).await {
            Ok(listener) => listener,
            Err(source) => {
                self.state.send_replace(ListenerState::Stopped);
                return Err(ListenerError::Bind { port, source });
            }
        };
        let local_addr = listener.local_addr().map_err(|source| {
            self.state.send_replace(ListenerState::Stopped);
            ListenerError::Bind { port, source }
        })?;

        let (shutdown, signal) = oneshot::channel::<()>();
        let server = axum::serve(
            listener,
            self.app
                .clone()
                .into_make_service_with_connect_info::<SocketAddr>(),
        )
        .with_graceful_shutdown(async move {
            let _ = signal.await;
        });
        let task = tokio::spawn(async move { server.await });

        *running = Some(Running {
            shutdown,
            task,
            local_addr,
        });
        self.state.send_replace(ListenerState::Running);

        let url = format!("http://{}:{}", resolve_display_ip(), local_addr.port());
        tracing::info!(%local_addr, %url, "listener started");
        Ok(url)
    }

    /// Stop accepting connections, let in-flight requests finish, and
    /// release the port. Does nothing when already stopped.
    pub async fn stop(&self) -> Result<(), ListenerError> {
        let mut running = self.running.lock().await;
        let Some(server) = running.take() else {
            return Ok(());
        };

        self.state.send_replace(ListenerState::Stopping);
        let _ = server.shutdown.send(());
        let joined = server.task.await;
        self.state.send_replace(ListenerState::Stopped);

        match joined {
            Ok(Ok(())) => {
                tracing::info!(local_addr = %server.local_addr, "listener stopped");
                Ok(())
            }
            Ok(Err(e)) => Err(ListenerError::Task(e.to_string())),
            Err(e) => Err(ListenerError::Task(e.to_string())),
        }
    }
}

fn parse_port(input: &str) -> Result<u16, ListenerError> {
    match input.trim().parse::<u16>() {
        Ok(port) if port != 0 => Ok(port),
        _ => Err(ListenerError::Validation {
            input: input.to_string(),
        }),
    }
}

/// Interface name prefixes of bridges, tunnels and VM adapters.
const VIRTUAL_PREFIXES: &[&str] = &[
    "docker", "br-", "veth", "virbr", "vmnet", "vboxnet", "tun", "tap", "utun", "wg", "zt",
    "tailscale", "lxc", "cni", "flannel", "podman",
];

/// First usable IPv4 on a physical-looking interface, else `127.0.0.1`.
pub fn resolve_display_ip() -> IpAddr {
    let candidates: Vec<(String, IpAddr)> = match if_addrs::get_if_addrs() {
        Ok(interfaces) => interfaces
            .into_iter()
            .map(|iface| (iface.name.clone(), iface.ip()))
            .collect(),
        Err(e) => {
            tracing::debug!(error = %e, "interface enumeration failed");
            Vec::new()
        }
    };
    pick_display_ip(candidates)
}

fn pick_display_ip<I>(interfaces: I) -> IpAddr
where
    I: IntoIterator<Item = (String, IpAddr)>,
{
    interfaces
        .into_iter()
        .find_map(|(name, ip)| match ip {
            IpAddr::V4(v4)
                if !v4.is_loopback()
                    && !v4.is_link_local()
                    && !v4.is_unspecified()
                    && !is_virtual(&name) =>
            {
                Some(ip)
            }
            _ => None,
        })
        .unwrap_or(IpAddr::V4(Ipv4Addr::LOCALHOST))
}

fn is_virtual(name: &str) -> bool {
    let name = name.to_ascii_lowercase();
    VIRTUAL_PREFIXES.iter().any(|p| name.starts_with(p))
}
