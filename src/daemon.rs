//! Daemon: wires configuration, sockets, the prefix table and the control
//! server together and runs the per-port packet loops.

use crate::capture::{AfPacketSocket, Capture};
use crate::config::Config;
use crate::control::{replay, ControlServer, Journal, RuleControlService};
use crate::dataplane::{
    ActionExecutor, Egress, InterfaceHandle, PacketClassifier, PrefixTable, StaticRegistry,
};
use crate::telemetry::MetricsRegistry;
use crate::{Error, Result};
use std::collections::{HashMap, HashSet};
use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinSet;
use tracing::{debug, error, info, trace, warn};

/// Receive buffer size, enough for a jumbo-less frame with two VLAN tags
const RX_BUFFER: usize = 2048;
/// Pause after a transient receive error
const RX_ERROR_BACKOFF: Duration = Duration::from_millis(100);

/// Bound sockets keyed by ifindex
pub struct Interfaces<C> {
    by_index: HashMap<u32, (String, Arc<C>)>,
}

impl<C: Capture> Interfaces<C> {
    pub fn new() -> Self {
        Self {
            by_index: HashMap::new(),
        }
    }

    pub fn insert(&mut self, name: &str, socket: Arc<C>) {
        self.by_index
            .insert(socket.ifindex(), (name.to_string(), socket));
    }

    pub fn get(&self, ifindex: u32) -> Option<&(String, Arc<C>)> {
        self.by_index.get(&ifindex)
    }
}

impl<C: Capture> Default for Interfaces<C> {
    fn default() -> Self {
        Self::new()
    }
}

/// Egress side of one port: the default path plus every redirect target
pub struct PortEgress<C> {
    egress_name: String,
    egress: Arc<C>,
    interfaces: Arc<Interfaces<C>>,
    metrics: Arc<MetricsRegistry>,
}

impl<C: Capture> PortEgress<C> {
    pub fn new(
        egress_name: &str,
        egress: Arc<C>,
        interfaces: Arc<Interfaces<C>>,
        metrics: Arc<MetricsRegistry>,
    ) -> Self {
        Self {
            egress_name: egress_name.to_string(),
            egress,
            interfaces,
            metrics,
        }
    }

    fn transmit(&self, name: &str, socket: &C, frame: &[u8]) -> io::Result<()> {
        match socket.try_send(frame) {
            Ok(_) => {
                self.metrics.record_tx(name, frame.len());
                Ok(())
            }
            Err(e) => {
                self.metrics.record_tx_error(name);
                Err(e)
            }
        }
    }
}

impl<C: Capture> Egress for PortEgress<C> {
    fn forward(&self, frame: &[u8]) -> io::Result<()> {
        self.transmit(&self.egress_name, &self.egress, frame)
    }

    fn send_to(&self, handle: InterfaceHandle, frame: &[u8]) -> io::Result<()> {
        match self.interfaces.get(handle.ifindex()) {
            Some((name, socket)) => self.transmit(name, socket, frame),
            None => Err(io::Error::from_raw_os_error(libc::ENODEV)),
        }
    }
}

/// Receive errors after which the port cannot recover
fn is_fatal_rx(err: &Error) -> bool {
    match err {
        Error::Io(e) => matches!(
            e.raw_os_error(),
            Some(libc::ENODEV) | Some(libc::ENXIO) | Some(libc::EBADF)
        ),
        _ => false,
    }
}

/// Packet loop for one ingress interface.
///
/// Returns only when the ingress interface is gone.
pub async fn run_port<C: Capture>(
    ingress_name: String,
    ingress: Arc<C>,
    egress: PortEgress<C>,
    classifier: Arc<PacketClassifier>,
    executor: Arc<ActionExecutor>,
    metrics: Arc<MetricsRegistry>,
) -> Result<()> {
    info!(ingress = %ingress_name, egress = %egress.egress_name, "Port started");
    let mut buf = vec![0u8; RX_BUFFER];

    loop {
        let rx = match ingress.recv(&mut buf).await {
            Ok(rx) => rx,
            Err(e) if is_fatal_rx(&e) => {
                error!(ingress = %ingress_name, "Port stopped: {}", e);
                return Err(e);
            }
            Err(e) => {
                metrics.record_rx_error(&ingress_name);
                error!(ingress = %ingress_name, "Receive error: {}", e);
                tokio::time::sleep(RX_ERROR_BACKOFF).await;
                continue;
            }
        };

        let frame = &buf[..rx.len];
        metrics.packets_received.inc();
        metrics.record_rx(&ingress_name, rx.len);

        let action = classifier.classify_frame(frame);
        let disposition = executor.execute(&action, frame, &egress);
        trace!(ingress = %ingress_name, %action, ?disposition, "Frame handled");
    }
}

/// Log all counters every `interval`.
async fn log_stats(metrics: Arc<MetricsRegistry>, table: Arc<PrefixTable>, interval: Duration) {
    let mut ticker = tokio::time::interval(interval);
    ticker.tick().await;
    loop {
        ticker.tick().await;
        metrics.set_rule_count(table.len());
        let line = metrics
            .export()
            .iter()
            .map(|(k, v)| format!("{k}={v}"))
            .collect::<Vec<_>>()
            .join(" ");
        info!(stats = %line, "Statistics");
    }
}

/// Run the daemon until Ctrl-C or a task fails.
pub async fn run(config: Config) -> Result<()> {
    let metrics = Arc::new(MetricsRegistry::new());
    let registry = Arc::new(StaticRegistry::new());

    let ingress_names: HashSet<&str> = config.ports.iter().map(|p| p.ingress.as_str()).collect();
    let mut interfaces = Interfaces::new();
    let mut sockets: HashMap<String, Arc<AfPacketSocket>> = HashMap::new();
    for name in config.interface_names() {
        info!("Binding to interface {}...", name);
        let socket = AfPacketSocket::bind(&name, ingress_names.contains(name.as_str()))
            .map_err(|e| {
                Error::Config(format!(
                    "failed to bind to {}: {}. Run with root privileges.",
                    name, e
                ))
            })?;
        let socket = Arc::new(socket);
        registry.insert(&name, InterfaceHandle::new(socket.ifindex()));
        metrics.register_interface(&name);
        interfaces.insert(&name, Arc::clone(&socket));
        debug!(interface = %name, ifindex = socket.ifindex(), "Interface registered");
        sockets.insert(name, socket);
    }
    let interfaces = Arc::new(interfaces);

    let table = Arc::new(PrefixTable::with_options(
        registry.clone(),
        config.table.default_action.into(),
        config.table.max_entries,
    ));

    let journal = match &config.journal {
        Some(journal_config) => {
            let (journal, records) = Journal::open(&journal_config.path)?;
            replay(&records, &table);
            Some(journal)
        }
        None => None,
    };
    let service = Arc::new(RuleControlService::with_journal(
        table.clone(),
        metrics.clone(),
        journal,
    ));
    if config.journal.as_ref().is_some_and(|j| j.compact_on_start) {
        service.compact_journal()?;
    }

    for rule in &config.rules {
        let outcome = service.update_rule(&rule.to_request());
        if !outcome.succeeded() {
            warn!(prefix = %rule.prefix, detail = %outcome.detail, "Startup rule not installed");
        }
    }
    info!(
        rules = table.len(),
        default = %table.default_action(),
        match_field = ?config.table.match_field,
        "Prefix table ready"
    );

    let classifier = Arc::new(PacketClassifier::new(
        table.clone(),
        config.table.match_field,
    ));
    let executor = Arc::new(ActionExecutor::new(registry.clone(), metrics.clone()));

    let listen: SocketAddr = config
        .control
        .listen
        .parse()
        .map_err(|_| Error::Config(format!("invalid control.listen: {}", config.control.listen)))?;
    let server = ControlServer::bind(
        listen,
        service.clone(),
        Duration::from_millis(config.control.request_timeout_ms),
    )
    .await?;

    let mut tasks = JoinSet::new();
    tasks.spawn(server.serve());

    for port in &config.ports {
        let (Some(ingress), Some(egress)) = (sockets.get(&port.ingress), sockets.get(&port.egress))
        else {
            return Err(Error::InterfaceNotFound {
                name: port.ingress.clone(),
            });
        };
        let port_egress = PortEgress::new(
            &port.egress,
            Arc::clone(egress),
            interfaces.clone(),
            metrics.clone(),
        );
        tasks.spawn(run_port(
            port.ingress.clone(),
            Arc::clone(ingress),
            port_egress,
            classifier.clone(),
            executor.clone(),
            metrics.clone(),
        ));
    }

    if config.metrics.interval_secs > 0 {
        let interval = Duration::from_secs(config.metrics.interval_secs);
        let (metrics, table) = (metrics.clone(), table.clone());
        tasks.spawn(async move {
            log_stats(metrics, table, interval).await;
            Ok(())
        });
    }

    info!("Filter started, processing packets...");

    let result = tokio::select! {
        signal = tokio::signal::ctrl_c() => {
            signal?;
            info!("Shutting down");
            Ok(())
        }
        Some(joined) = tasks.join_next() => match joined {
            Ok(Ok(())) => Ok(()),
            Ok(Err(e)) => Err(e),
            Err(e) => Err(Error::Io(io::Error::other(e))),
        },
    };

    tasks.abort_all();
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::RxInfo;
    use crate::dataplane::{Action, MatchField, Prefix};
    use std::sync::Mutex;
    use tokio::sync::mpsc;

    struct MockCapture {
        ifindex: u32,
        rx: tokio::sync::Mutex<mpsc::UnboundedReceiver<Vec<u8>>>,
        sent: Mutex<Vec<Vec<u8>>>,
    }

    impl MockCapture {
        fn new(ifindex: u32) -> (Arc<Self>, mpsc::UnboundedSender<Vec<u8>>) {
            let (tx, rx) = mpsc::unbounded_channel();
            let capture = Arc::new(Self {
                ifindex,
                rx: tokio::sync::Mutex::new(rx),
                sent: Mutex::new(Vec::new()),
            });
            (capture, tx)
        }

        fn sent(&self) -> Vec<Vec<u8>> {
            self.sent.lock().unwrap().clone()
        }
    }

    impl Capture for MockCapture {
        async fn recv(&self, buf: &mut [u8]) -> Result<RxInfo> {
            match self.rx.lock().await.recv().await {
                Some(frame) => {
                    buf[..frame.len()].copy_from_slice(&frame);
                    Ok(RxInfo { len: frame.len() })
                }
                None => Err(Error::Io(io::Error::from_raw_os_error(libc::ENODEV))),
            }
        }

        fn try_send(&self, buf: &[u8]) -> io::Result<usize> {
            self.sent.lock().unwrap().push(buf.to_vec());
            Ok(buf.len())
        }

        fn ifindex(&self) -> u32 {
            self.ifindex
        }
    }

    fn ipv4_frame(dst: [u8; 4]) -> Vec<u8> {
        let mut frame = vec![0u8; 12];
        frame.extend_from_slice(&[0x08, 0x00]);
        frame.extend_from_slice(&[
            0x45, 0x00, 0x00, 0x14, 0x00, 0x00, 0x40, 0x00, 0x40, 0x11, 0x00, 0x00, 192, 0, 2, 1,
        ]);
        frame.extend_from_slice(&dst);
        frame
    }

    #[tokio::test]
    async fn test_port_loop_applies_rules() {
        let (eth0, feed) = MockCapture::new(1);
        let (eth1, _) = MockCapture::new(2);
        let (eth3, _) = MockCapture::new(4);

        let registry = Arc::new(StaticRegistry::with_interfaces([("eth1", 2), ("eth3", 4)]));
        let metrics = Arc::new(MetricsRegistry::new());
        let table = Arc::new(PrefixTable::new(registry.clone()));
        table
            .install(Prefix::parse("10.0.0.0/8").unwrap(), Action::Drop)
            .unwrap();
        table
            .install(Prefix::parse("8.8.8.8/32").unwrap(), Action::redirect("eth3"))
            .unwrap();

        let mut interfaces = Interfaces::new();
        interfaces.insert("eth1", eth1.clone());
        interfaces.insert("eth3", eth3.clone());
        let egress = PortEgress::new("eth1", eth1.clone(), Arc::new(interfaces), metrics.clone());

        let classifier = Arc::new(PacketClassifier::new(table, MatchField::Destination));
        let executor = Arc::new(ActionExecutor::new(registry, metrics.clone()));

        feed.send(ipv4_frame([10, 1, 2, 3])).unwrap();
        feed.send(ipv4_frame([8, 8, 8, 8])).unwrap();
        feed.send(ipv4_frame([1, 1, 1, 1])).unwrap();
        feed.send(vec![0xff; 20]).unwrap();
        drop(feed);

        let result = run_port(
            "eth0".to_string(),
            eth0,
            egress,
            classifier,
            executor,
            metrics.clone(),
        )
        .await;
        assert!(result.is_err());

        assert_eq!(eth1.sent(), vec![ipv4_frame([1, 1, 1, 1]), vec![0xff; 20]]);
        assert_eq!(eth3.sent(), vec![ipv4_frame([8, 8, 8, 8])]);
        assert_eq!(metrics.packets_received.get(), 4);
        assert_eq!(metrics.packets_dropped.get(), 1);
        assert_eq!(metrics.packets_redirected.get(), 1);
        assert_eq!(metrics.packets_passed.get(), 2);
    }

    #[test]
    fn test_send_to_unknown_ifindex_is_enodev() {
        let (eth1, _) = MockCapture::new(2);
        let egress = PortEgress::new(
            "eth1",
            eth1,
            Arc::new(Interfaces::new()),
            Arc::new(MetricsRegistry::new()),
        );
        let err = egress
            .send_to(InterfaceHandle::new(9), &[0u8; 14])
            .unwrap_err();
        assert_eq!(err.raw_os_error(), Some(libc::ENODEV));
    }
}
