use std::sync::Arc;
use std::time::Duration;

use corvid_consensus::{CoreEvent, RoundInfo};
use corvid_core::{Address, Block, BlockHeader, Hash, HeaderExtra, Salt, View};
use corvid_mempool::RequestSet;
use tokio::sync::mpsc::UnboundedSender;
use tokio::sync::watch;
use tracing::{debug, info, warn};

/// Block producer settings
#[derive(Debug, Clone)]
pub struct ProducerConfig {
    pub chain_id: u64,
    pub block_interval: Duration,
    pub txs_per_block: usize,
}

/// Feeds one validator's engine with blocks to propose.
///
/// Whenever the engine reports that it leads a round and has nothing to
/// propose, the producer builds a block on the round's parent and queues it.
pub struct BlockProducer {
    config: ProducerConfig,
    address: Address,
    validators: Vec<Address>,
    requests: Arc<RequestSet>,
    events: UnboundedSender<CoreEvent>,
    last_built: Option<View>,
}

impl BlockProducer {
    pub fn new(
        config: ProducerConfig,
        address: Address,
        validators: Vec<Address>,
        requests: Arc<RequestSet>,
        events: UnboundedSender<CoreEvent>,
    ) -> Self {
        BlockProducer {
            config,
            address,
            validators,
            requests,
            events,
            last_built: None,
        }
    }

    /// Block extending `parent` at `view.height` with synthetic payloads
    pub fn build_block(&self, parent: Hash, view: View, timestamp: u64) -> Block {
        let txs = (0..self.config.txs_per_block)
            .map(|i| {
                format!(
                    "{}:{}:{}:{}:{}",
                    self.config.chain_id,
                    self.address.short(),
                    view.height,
                    view.round,
                    i
                )
                .into_bytes()
            })
            .collect();
        let extra = HeaderExtra::new(self.validators.clone(), Salt::default());
        let mut block = Block::new(
            BlockHeader {
                parent_hash: parent,
                height: view.height,
                timestamp,
                coinbase: self.address,
                tx_root: Hash::ZERO,
                state_root: Hash::ZERO,
                extra: Vec::new(),
            },
            txs,
        );
        block.header.tx_root = block.compute_tx_root();
        match extra.encode() {
            Ok(bytes) => block.header.extra = bytes,
            Err(e) => warn!("Failed to encode header extra: {}", e),
        }
        block
    }

    /// Queue a block for `info` if the engine is waiting on one
    pub fn on_round(&mut self, info: &RoundInfo, timestamp: u64) -> Option<Hash> {
        if !info.awaiting_request || self.last_built == Some(info.view) {
            return None;
        }
        self.last_built = Some(info.view);

        let block = self.build_block(info.parent, info.view, timestamp);
        match self.requests.add(block) {
            Ok(hash) => {
                debug!("Queued block {} for {}", hash.short(), info.view);
                let _ = self.events.send(CoreEvent::Request(hash));
                Some(hash)
            }
            Err(e) => {
                warn!("Failed to queue block for {}: {}", info.view, e);
                None
            }
        }
    }

    pub async fn run(
        mut self,
        mut rounds: watch::Receiver<RoundInfo>,
        mut shutdown: watch::Receiver<bool>,
    ) {
        info!("Block producer running for {}", self.address.short());
        loop {
            if rounds.borrow_and_update().awaiting_request {
                tokio::select! {
                    _ = tokio::time::sleep(self.config.block_interval) => {}
                    _ = shutdown.changed() => break,
                }
                // The round may have moved on while sleeping.
                let info = rounds.borrow_and_update().clone();
                self.on_round(&info, unix_millis());
            }
            tokio::select! {
                changed = rounds.changed() => {
                    if changed.is_err() {
                        break;
                    }
                }
                _ = shutdown.changed() => break,
            }
        }
        debug!("Block producer for {} stopped", self.address.short());
    }
}

fn unix_millis() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or_default()
}
