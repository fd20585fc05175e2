use crate::network::Interface;
use crate::worker_pool::{FrameSubmitter, InboundFrame};
use anyhow::{Context, bail};
use log::{debug, error, warn};
use pnet::datalink::{self, Channel, DataLinkReceiver, DataLinkSender, MacAddr};
use pnet::packet::ethernet::EthernetPacket;
use std::collections::HashMap;
use std::sync::mpsc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

/// Raw frame output. Implementations must not block the caller for long:
/// transmit is called with the router state locked.
pub trait Link: Send + Sync + 'static {
    fn transmit(&self, interface: &str, frame: Vec<u8>);
}

/// `Link` over pnet datalink channels, one sender thread per interface.
pub struct PnetLink {
    senders: HashMap<String, mpsc::Sender<Vec<u8>>>,
}

/// Receive half of one interface's datalink channel.
pub struct FrameSource {
    interface: String,
    mac: MacAddr,
    rx: Box<dyn DataLinkReceiver>,
}

impl PnetLink {
    /// Opens an Ethernet channel on every interface.
    pub fn open(interfaces: &[Interface]) -> anyhow::Result<(Self, Vec<FrameSource>)> {
        let system = datalink::interfaces();
        let mut senders = HashMap::new();
        let mut sources = Vec::new();

        for iface in interfaces {
            let Some(nic) = system.iter().find(|nic| nic.name == iface.name) else {
                bail!("Interface {} not found", iface.name);
            };

            let (tx, rx) = match datalink::channel(nic, Default::default())
                .with_context(|| format!("Failed to open datalink channel on {}", iface.name))?
            {
                Channel::Ethernet(tx, rx) => (tx, rx),
                _ => bail!("Unsupported channel type on {}", iface.name),
            };

            let (queue_tx, queue_rx) = mpsc::channel();
            spawn_transmitter(iface.name.clone(), tx, queue_rx)?;
            senders.insert(iface.name.clone(), queue_tx);
            sources.push(FrameSource {
                interface: iface.name.clone(),
                mac: iface.mac,
                rx,
            });
        }

        Ok((Self { senders }, sources))
    }
}

impl Link for PnetLink {
    fn transmit(&self, interface: &str, frame: Vec<u8>) {
        match self.senders.get(interface) {
            Some(sender) => {
                if sender.send(frame).is_err() {
                    error!("Transmit thread for {} is gone", interface);
                }
            }
            None => warn!("No link for interface {}", interface),
        }
    }
}

fn spawn_transmitter(
    interface: String,
    mut tx: Box<dyn DataLinkSender>,
    queue: mpsc::Receiver<Vec<u8>>,
) -> anyhow::Result<JoinHandle<()>> {
    let handle = thread::Builder::new()
        .name(format!("tx-{}", interface))
        .spawn(move || {
            for frame in queue {
                match tx.send_to(&frame, None) {
                    Some(Ok(())) => {}
                    Some(Err(e)) => warn!("Failed to send frame on {}: {}", interface, e),
                    None => warn!("Frame dropped on {}: sender buffer too small", interface),
                }
            }
            debug!("Transmit thread for {} stopped", interface);
        })?;
    Ok(handle)
}

impl FrameSource {
    pub fn interface(&self) -> &str {
        &self.interface
    }

    /// Reads frames on a dedicated thread and hands them to the worker pool.
    pub fn spawn(mut self, submitter: FrameSubmitter) -> anyhow::Result<JoinHandle<()>> {
        let handle = thread::Builder::new()
            .name(format!("rx-{}", self.interface))
            .spawn(move || {
                loop {
                    match self.rx.next() {
                        Ok(frame) => {
                            // Our own transmissions are looped back by the socket
                            let own = EthernetPacket::new(frame)
                                .is_some_and(|ethernet| ethernet.get_source() == self.mac);
                            if own {
                                continue;
                            }
                            let inbound = InboundFrame {
                                interface: self.interface.clone(),
                                frame: frame.to_vec(),
                            };
                            if !submitter.submit(inbound) && submitter.is_closed() {
                                break;
                            }
                        }
                        Err(e) => {
                            error!("Receive error on {}: {}", self.interface, e);
                            thread::sleep(Duration::from_millis(100));
                        }
                    }
                }
                debug!("Receive thread for {} stopped", self.interface);
            })?;
        Ok(handle)
    }
}
