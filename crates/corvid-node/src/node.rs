use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use corvid_chain::{ChainStore, FileStorage, MemoryStorage, Storage, StorageKind};
use corvid_consensus::{Collaborators, Core, Ed25519Signer, ValidatorSet};
use corvid_core::Block;
use corvid_mempool::{RequestSet, RequestSetConfig};
use tokio::sync::mpsc::unbounded_channel;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{error, info};

use crate::config::NodeConfig;
use crate::network::{LocalNetwork, NodeBackend};
use crate::producer::{BlockProducer, ProducerConfig};
use crate::rpc::{create_router, RpcState, ValidatorHandle};

/// Every validator of the configured set, running in this process
pub struct Devnet {
    validators: Vec<ValidatorHandle>,
    network: Arc<LocalNetwork>,
    shutdown: watch::Sender<bool>,
    tasks: Vec<JoinHandle<()>>,
}

impl Devnet {
    /// Open each validator's chain, then spawn its engine and block producer
    pub fn start(config: &NodeConfig) -> Result<Self> {
        let keys = config.validator_keys();
        let addresses: Vec<_> = keys.iter().map(|k| k.address).collect();
        let valset = ValidatorSet::new(addresses.clone())?;
        let genesis = Block::genesis(addresses.clone(), config.genesis_timestamp)?;
        info!(
            "Genesis {} with {} validators",
            genesis.hash()?.short(),
            addresses.len()
        );

        let (senders, receivers): (Vec<_>, Vec<_>) =
            keys.iter().map(|_| unbounded_channel()).unzip();
        let network = Arc::new(LocalNetwork::new(
            addresses.iter().copied().zip(senders.iter().cloned()).collect(),
        ));
        let (shutdown, shutdown_rx) = watch::channel(false);
        let producer_config = ProducerConfig {
            chain_id: config.chain_id,
            block_interval: Duration::from_millis(config.block_interval_ms),
            txs_per_block: config.txs_per_block,
        };

        let mut validators = Vec::with_capacity(keys.len());
        let mut tasks = Vec::with_capacity(keys.len() * 2);
        for (i, (key, events)) in keys.into_iter().zip(receivers).enumerate() {
            let storage: Box<dyn Storage> = match config.storage {
                StorageKind::Memory => Box::new(MemoryStorage::new()),
                StorageKind::File => {
                    let path = config
                        .data_dir
                        .join(format!("validator-{}", i))
                        .join("chain.bin");
                    Box::new(FileStorage::open(path)?)
                }
            };
            let chain = Arc::new(ChainStore::new(storage));
            chain.init_genesis(&genesis)?;

            let address = key.address;
            let backend = Arc::new(NodeBackend::new(address, network.clone(), chain.clone()));
            let deps = Collaborators {
                backend: backend.clone(),
                signer: Arc::new(Ed25519Signer::new(key)),
                chain: backend.clone(),
                snapshots: backend,
            };
            let requests = Arc::new(RequestSet::new(RequestSetConfig::default()));
            let core = Core::new(
                config.consensus.clone(),
                valset.clone(),
                deps,
                requests.clone(),
                senders[i].clone(),
            )?;
            let rounds = core.subscribe();

            let producer = BlockProducer::new(
                producer_config.clone(),
                address,
                addresses.clone(),
                requests,
                senders[i].clone(),
            );
            tasks.push(tokio::spawn(core.run(events, shutdown_rx.clone())));
            tasks.push(tokio::spawn(
                producer.run(rounds.clone(), shutdown_rx.clone()),
            ));

            info!(
                "Validator {} is {} at height {:?}",
                i,
                address.short(),
                chain.height()
            );
            validators.push(ValidatorHandle {
                address,
                chain,
                rounds,
            });
        }

        Ok(Devnet {
            validators,
            network,
            shutdown,
            tasks,
        })
    }

    pub fn validators(&self) -> &[ValidatorHandle] {
        &self.validators
    }

    pub fn rpc_state(&self, chain_id: u64) -> RpcState {
        RpcState {
            chain_id,
            network: self.network.clone(),
            validators: self.validators.clone(),
        }
    }

    /// Lowest finalized height across validators
    pub fn min_height(&self) -> u64 {
        self.validators()
            .iter()
            .map(|v| v.chain.height().unwrap_or_default())
            .min()
            .unwrap_or_default()
    }

    /// Signal every task to stop and wait for them
    pub async fn shutdown(self) {
        let _ = self.shutdown.send(true);
        for task in self.tasks {
            if let Err(e) = task.await {
                error!("Devnet task failed: {}", e);
            }
        }
    }
}

/// The Corvid node
pub struct Node {
    config: NodeConfig,
}

impl Node {
    pub fn new(config: NodeConfig) -> Result<Self> {
        config.validate()?;
        Ok(Node { config })
    }

    /// Run the devnet and status endpoint until Ctrl-C
    pub async fn run(self) -> Result<()> {
        info!(
            "Starting Corvid devnet {} with {} validators",
            self.config.chain_id, self.config.validator_count
        );
        let devnet = Devnet::start(&self.config)?;

        let router = create_router(Arc::new(devnet.rpc_state(self.config.chain_id)));
        let listener = tokio::net::TcpListener::bind(self.config.rpc_addr).await?;
        info!("Status endpoint listening on {}", self.config.rpc_addr);

        let served = axum::serve(listener, router)
            .with_graceful_shutdown(async {
                let _ = tokio::signal::ctrl_c().await;
            })
            .await;
        if let Err(e) = served {
            error!("Status endpoint error: {}", e);
        }

        info!("Shutting down at height {}", devnet.min_height());
        devnet.shutdown().await;
        Ok(())
    }
}
