//! The `pbft-node` binary: wires transport, consensus, client, storage, and
//! telemetry into one running replica process.
//!
//! Structured the way the teacher's own node binaries are: init tracing,
//! spawn the telemetry HTTP server, parse CLI opts, load and validate
//! config, build every component, spawn its background tasks, then block
//! on `ctrl_c` for a graceful shutdown.

mod client_listener;
mod config;
mod dispatch;
mod executor;

use anyhow::Result;
use clap::Parser;
use pbft_api::crypto::{SignatureVerifier, SigningKey};
use pbft_client::ResponseManager;
use pbft_consensus::{CheckpointManager, CollectorPool, CommitmentEngine, ExecutorAdapter, SequenceManager, SystemInfo};
use pbft_crypto::ReplicaVerifier;
use pbft_storage::RedbStore;
use pbft_telemetry::PrometheusSink;
use pbft_transport::{ReplicaBroadcaster, Transport};
use std::sync::Arc;
use std::time::Duration;

use crate::config::{client_listen_addr, load_key_pair, load_replica_config, NodeOpts};
use crate::executor::KvExecutor;

#[tokio::main]
async fn main() -> Result<()> {
    pbft_telemetry::init::init_tracing()?;

    let opts = NodeOpts::parse();
    let replica_config = load_replica_config(&opts.config)?;
    let key_pair = load_key_pair(&replica_config)?;

    let self_id = replica_config.self_id;
    let n = replica_config.n();
    let f = replica_config.max_faults();
    let tunables = replica_config.tunables.clone();

    let prometheus_sink = PrometheusSink::new()?;
    let registry = prometheus_sink.registry();
    tokio::spawn(pbft_telemetry::http::run_server(opts.metrics_addr, registry));
    let metrics = Arc::new(prometheus_sink);

    std::fs::create_dir_all(&opts.data_dir)?;
    let db_path = opts.data_dir.join(format!("replica-{self_id}.redb"));
    let store: Arc<dyn pbft_api::storage::KvStore> = Arc::new(RedbStore::open(db_path)?);
    let executor: Arc<dyn pbft_api::executor::Executor> = Arc::new(KvExecutor::new(store));

    let replica_verifier = Arc::new(ReplicaVerifier::new(key_pair, &replica_config));
    let signer: Arc<dyn SigningKey> = replica_verifier.clone();
    let sig_verifier: Arc<dyn SignatureVerifier> = replica_verifier.clone();

    let system_info = Arc::new(SystemInfo::new(&replica_config));
    let sequence_manager = Arc::new(SequenceManager::new(tunables.max_in_flight));
    let collector_pool = Arc::new(CollectorPool::new(
        tunables.max_in_flight as u32,
        n,
        f,
        metrics.clone(),
    ));
    let checkpoint_manager = Arc::new(CheckpointManager::new(f, metrics.clone()));

    let transport = Transport::start(&replica_config, metrics.clone());
    let broadcaster = Arc::new(ReplicaBroadcaster::new(transport.clone(), metrics.clone()));

    let (exec_tx, exec_rx) = tokio::sync::mpsc::channel(pbft_consensus::executor_adapter::EXEC_QUEUE_CAPACITY);
    let commitment_engine = Arc::new(CommitmentEngine::new(
        self_id,
        tunables.need_qc,
        system_info.clone(),
        sequence_manager.clone(),
        collector_pool.clone(),
        broadcaster.clone(),
        sig_verifier.clone(),
        signer.clone(),
        metrics.clone(),
        exec_tx,
    ));

    let executor_adapter = ExecutorAdapter::new(
        executor,
        sequence_manager.clone(),
        checkpoint_manager.clone(),
        collector_pool.clone(),
        metrics.clone(),
    );
    {
        let broadcaster = broadcaster.clone();
        let signer = signer.clone();
        tokio::spawn(async move {
            executor_adapter
                .run(exec_rx, broadcaster, self_id, move |data: &[u8]| signer.sign(data))
                .await;
        });
    }

    let (response_manager, submit_rx) = ResponseManager::new(
        self_id,
        f,
        tunables.client_batch_num,
        Duration::from_millis(tunables.client_batch_wait_time_ms),
        tunables.max_process_txn,
        system_info.clone(),
        broadcaster.clone(),
        signer.clone(),
        sig_verifier.clone(),
        metrics.clone(),
    );
    {
        let response_manager = response_manager.clone();
        tokio::spawn(async move {
            response_manager.run_batcher(submit_rx).await;
        });
    }

    {
        let checkpoint_manager = checkpoint_manager.clone();
        let broadcaster = broadcaster.clone();
        let signer = signer.clone();
        tokio::spawn(async move {
            pbft_consensus::checkpoint::run_checkpoint_broadcaster(
                checkpoint_manager,
                broadcaster,
                self_id,
                move |data: &[u8]| signer.sign(data),
            )
            .await;
        });
    }

    {
        let transport = transport.clone();
        let commitment_engine = commitment_engine.clone();
        let checkpoint_manager = checkpoint_manager.clone();
        let response_manager = response_manager.clone();
        let sig_verifier = sig_verifier.clone();
        tokio::spawn(async move {
            dispatch::run_dispatch_loop(
                transport,
                commitment_engine,
                checkpoint_manager,
                response_manager,
                sig_verifier,
            )
            .await;
        });
    }

    {
        let client_addr = client_listen_addr(&replica_config);
        let response_manager = response_manager.clone();
        tokio::spawn(async move {
            client_listener::run_client_listener(client_addr, response_manager).await;
        });
    }

    tracing::info!(replica = self_id, n, f, "pbft-node started");

    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("received ctrl-c, shutting down");
        }
    }

    Ok(())
}
