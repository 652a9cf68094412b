//! L2/L3 forwarding pipelines (spec §4.7): each pipeline is two fixed-size
//! stages, a learn stage feeding a lookup stage, connected by bounded
//! queues and run on dedicated OS threads (this crate's pipelines are
//! plain `std::thread` pools rather than `tokio` tasks, since their work is
//! CPU-bound packet processing rather than socket I/O — the same split the
//! teacher draws between its async transport layer and any CPU-bound work).

use std::sync::mpsc::{sync_channel, Receiver, RecvTimeoutError, SyncSender};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;
use std::time::Duration;

use crate::config::PipelineConfig;
use crate::mac::MacTable;
use crate::rib::{rib_lookup, L3Packet, Rib, RibLookupOutcome};

const QUEUE_POLL_TIMEOUT: Duration = Duration::from_millis(100);

/// A raw Ethernet frame entering a pipeline, carrying the minimum fields
/// both stages need.
#[derive(Clone, Debug)]
pub struct Frame {
    pub ingress_port: u32,
    pub src_mac: u64,
    pub dst_mac: u64,
    pub l3: Option<L3Packet>,
}

/// Outcome the pipeline's last stage hands to the egress queue.
#[derive(Clone, Debug)]
pub enum PipelineOutcome {
    Forward { frame: Frame, output_port: u32 },
    Flood { frame: Frame },
    SendToKernel { frame: Frame },
    Drop,
}

/// Handle to one running stage; `shutdown` wakes every blocked reader so
/// the stage can observe cancellation and drain (spec §4.7: "pre-pause
/// wakes all queue readers so they can observe shutdown").
pub struct StageHandle {
    shutdown_flag: Arc<std::sync::atomic::AtomicBool>,
    threads: Vec<JoinHandle<()>>,
}

impl StageHandle {
    pub fn shutdown_graceful(self) {
        self.shutdown_flag
            .store(true, std::sync::atomic::Ordering::Release);
        for thread in self.threads {
            let _ = thread.join();
        }
    }
}

/// One forwarding pipeline (L2 or L3): a learn stage and a lookup stage,
/// each a fixed-size worker pool, connected by bounded queues.
pub struct Pipeline {
    pub input: SyncSender<Frame>,
    pub egress: Receiver<PipelineOutcome>,
    handle: Option<StageHandle>,
}

impl Pipeline {
    pub fn shutdown_graceful(mut self) {
        if let Some(handle) = self.handle.take() {
            handle.shutdown_graceful();
        }
    }

    /// spec §4.7 "L2": stage-0 learns source MAC, stage-1 resolves
    /// destination MAC.
    pub fn spawn_l2(config: PipelineConfig, mac_table: Arc<MacTable>) -> Self {
        let (input_tx, input_rx) = sync_channel::<Frame>(config.queue_capacity);
        let (mid_tx, mid_rx) = sync_channel::<Frame>(config.queue_capacity);
        let (egress_tx, egress_rx) = sync_channel::<PipelineOutcome>(config.queue_capacity);
        let shutdown_flag = Arc::new(std::sync::atomic::AtomicBool::new(false));

        let mid_rx = Arc::new(Mutex::new(mid_rx));
        let input_rx = Arc::new(Mutex::new(input_rx));
        let mut threads = Vec::new();

        for _ in 0..config.workers_per_stage {
            let table = mac_table.clone();
            let rx = input_rx.clone();
            let tx = mid_tx.clone();
            let flag = shutdown_flag.clone();
            threads.push(std::thread::spawn(move || {
                let mut local = table.register_worker(config.queue_capacity);
                run_stage(&flag, &rx, config.batch_size, |frame| {
                    table.learn(&mut local, frame.ingress_port, frame.src_mac);
                    let _ = tx.try_send(frame);
                });
            }));
        }
        drop(mid_tx);

        for _ in 0..config.workers_per_stage {
            let table = mac_table.clone();
            let rx = mid_rx.clone();
            let tx = egress_tx.clone();
            let flag = shutdown_flag.clone();
            threads.push(std::thread::spawn(move || {
                let mut local = table.register_worker(config.queue_capacity);
                run_stage(&flag, &rx, config.batch_size, |frame| {
                    let outcome = match table.lookup(&mut local, frame.dst_mac) {
                        crate::mac::MacLookup::Hit { port, .. } => {
                            PipelineOutcome::Forward {
                                frame: frame.clone(),
                                output_port: port,
                            }
                        }
                        crate::mac::MacLookup::Flood => PipelineOutcome::Flood { frame: frame.clone() },
                    };
                    let _ = tx.try_send(outcome);
                });
            }));
        }
        drop(egress_tx);

        Pipeline {
            input: input_tx,
            egress: egress_rx,
            handle: Some(StageHandle {
                shutdown_flag,
                threads,
            }),
        }
    }

    /// spec §4.7 "L3": stage-0 learns source MAC, stage-1 runs `rib_lookup`.
    pub fn spawn_l3(config: PipelineConfig, mac_table: Arc<MacTable>, rib: Arc<Rib>) -> Self {
        let (input_tx, input_rx) = sync_channel::<Frame>(config.queue_capacity);
        let (mid_tx, mid_rx) = sync_channel::<Frame>(config.queue_capacity);
        let (egress_tx, egress_rx) = sync_channel::<PipelineOutcome>(config.queue_capacity);
        let shutdown_flag = Arc::new(std::sync::atomic::AtomicBool::new(false));

        let mid_rx = Arc::new(Mutex::new(mid_rx));
        let input_rx = Arc::new(Mutex::new(input_rx));
        let mut threads = Vec::new();

        for _ in 0..config.workers_per_stage {
            let table = mac_table.clone();
            let rx = input_rx.clone();
            let tx = mid_tx.clone();
            let flag = shutdown_flag.clone();
            threads.push(std::thread::spawn(move || {
                let mut local = table.register_worker(config.queue_capacity);
                run_stage(&flag, &rx, config.batch_size, |frame| {
                    table.learn(&mut local, frame.ingress_port, frame.src_mac);
                    let _ = tx.try_send(frame);
                });
            }));
        }
        drop(mid_tx);

        for _ in 0..config.workers_per_stage {
            let table = mac_table.clone();
            let rib = rib.clone();
            let rx = mid_rx.clone();
            let tx = egress_tx.clone();
            let flag = shutdown_flag.clone();
            threads.push(std::thread::spawn(move || {
                let mut mac_local = table.register_worker(config.queue_capacity);
                let mut rib_local = rib.register_worker();
                run_stage(&flag, &rx, config.batch_size, |mut frame| {
                    let Some(mut l3) = frame.l3.take() else {
                        let _ = tx.try_send(PipelineOutcome::Drop);
                        return;
                    };
                    let outcome = rib_lookup(&rib, &mut rib_local, &table, &mut mac_local, &mut l3);
                    let result = match outcome {
                        RibLookupOutcome::Forward => PipelineOutcome::Forward {
                            output_port: l3.output_port.unwrap_or(0),
                            frame: Frame { l3: Some(l3), ..frame },
                        },
                        RibLookupOutcome::SendToKernel => {
                            PipelineOutcome::SendToKernel {
                                frame: Frame { l3: Some(l3), ..frame },
                            }
                        }
                        RibLookupOutcome::Drop => PipelineOutcome::Drop,
                    };
                    let _ = tx.try_send(result);
                });
            }));
        }
        drop(egress_tx);

        Pipeline {
            input: input_tx,
            egress: egress_rx,
            handle: Some(StageHandle {
                shutdown_flag,
                threads,
            }),
        }
    }
}

fn run_stage(
    shutdown: &std::sync::atomic::AtomicBool,
    rx: &Mutex<Receiver<Frame>>,
    batch_size: usize,
    mut process: impl FnMut(Frame),
) {
    loop {
        if shutdown.load(std::sync::atomic::Ordering::Acquire) {
            return;
        }
        let mut processed_in_batch = 0;
        loop {
            let recv_result = {
                let guard = rx.lock().unwrap();
                guard.recv_timeout(QUEUE_POLL_TIMEOUT)
            };
            match recv_result {
                Ok(frame) => {
                    process(frame);
                    processed_in_batch += 1;
                    if processed_in_batch >= batch_size {
                        break;
                    }
                }
                Err(RecvTimeoutError::Timeout) => break,
                Err(RecvTimeoutError::Disconnected) => return,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::MacTableConfig;
    use std::time::Duration;

    #[test]
    fn l2_pipeline_learns_then_resolves_known_destination() {
        let config = PipelineConfig {
            batch_size: 8,
            queue_capacity: 16,
            workers_per_stage: 1,
        };
        let mac_table = Arc::new(MacTable::new(MacTableConfig::default()));

        let mut learner = mac_table.register_worker(16);
        mac_table.learn(&mut learner, 3, 0xdeadbeef0001);
        mac_table.update().unwrap();

        let pipeline = Pipeline::spawn_l2(config, mac_table);
        pipeline
            .input
            .send(Frame {
                ingress_port: 1,
                src_mac: 0x1111,
                dst_mac: 0xdeadbeef0001,
                l3: None,
            })
            .unwrap();

        let outcome = pipeline
            .egress
            .recv_timeout(Duration::from_secs(2))
            .expect("pipeline should produce an outcome");
        match outcome {
            PipelineOutcome::Forward { output_port, .. } => assert_eq!(output_port, 3),
            other => panic!("expected Forward, got {other:?}"),
        }

        pipeline.shutdown_graceful();
    }

    #[test]
    fn l2_pipeline_floods_unknown_destination() {
        let config = PipelineConfig {
            batch_size: 8,
            queue_capacity: 16,
            workers_per_stage: 1,
        };
        let mac_table = Arc::new(MacTable::new(MacTableConfig::default()));
        let pipeline = Pipeline::spawn_l2(config, mac_table);
        pipeline
            .input
            .send(Frame {
                ingress_port: 1,
                src_mac: 0x2222,
                dst_mac: 0x9999,
                l3: None,
            })
            .unwrap();

        let outcome = pipeline
            .egress
            .recv_timeout(Duration::from_secs(2))
            .expect("pipeline should produce an outcome");
        assert!(matches!(outcome, PipelineOutcome::Flood { .. }));

        pipeline.shutdown_graceful();
    }
}
