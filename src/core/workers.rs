//! 并行构建清单 - 列举任务、分析任务与协调者之间的消息协议
//!
//! 每棵树一个列举任务，按遍历顺序把路径放入共享工作队列；若干分析任务从队列取出路径、
//! 探测元数据与指纹，再把结果发回协调者。协调者用有序插入汇总结果，因此完成顺序不影响清单内容。

use crate::core::error::SyncError;
use crate::core::inventory::{FileInventory, InventoryEntry};
use crate::core::probe::probe;
use crate::core::scanner::{ScanOutcome, TreeWalker};
use futures::future::join_all;
use std::fmt;
use std::sync::Arc;
use tokio::runtime::Handle;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// 每个分析任务对应的队列容量
pub const QUEUE_CAPACITY_PER_ANALYZER: usize = 64;

/// 目录树标识
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TreeId {
    Source,
    Destination,
}

impl TreeId {
    pub const ALL: [TreeId; 2] = [TreeId::Source, TreeId::Destination];

    fn index(self) -> usize {
        match self {
            TreeId::Source => 0,
            TreeId::Destination => 1,
        }
    }
}

impl fmt::Display for TreeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TreeId::Source => write!(f, "source"),
            TreeId::Destination => write!(f, "destination"),
        }
    }
}

/// 任务间传递的消息
#[derive(Debug)]
pub enum Message {
    /// 待探测的条目（尚无元数据）
    Path { tree: TreeId, entry: InventoryEntry },
    /// 探测结果
    Result {
        tree: TreeId,
        outcome: Result<InventoryEntry, SyncError>,
    },
    /// 列举结束，`published` 为该树将产生的结果数
    EndOfStream { tree: TreeId, published: usize },
    /// 通知分析任务退出
    Terminate,
    /// 分析任务确认退出
    TerminateAck { worker: usize },
}

/// 任务角色及其配置
#[derive(Debug, Clone)]
pub enum WorkerRole {
    Lister { tree: TreeId, root: String },
    Analyzer { id: usize, use_fingerprint: bool },
}

impl WorkerRole {
    pub fn label(&self) -> String {
        match self {
            WorkerRole::Lister { tree, .. } => format!("lister-{}", tree),
            WorkerRole::Analyzer { id, .. } => format!("analyzer-{}", id),
        }
    }

    fn is_analyzer(&self) -> bool {
        matches!(self, WorkerRole::Analyzer { .. })
    }
}

/// 任务生命周期
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerState {
    Spawned,
    Running,
    Terminating,
    Reaped,
}

struct WorkerSlot {
    role: WorkerRole,
    state: WorkerState,
    handle: Option<JoinHandle<()>>,
}

/// 协调者持有的任务池状态
///
/// 在一次并行构建期间存在，结束前必须调用且只调用一次 [`ProcessContext::teardown`]。
pub struct ProcessContext {
    workers: Vec<WorkerSlot>,
    work_tx: mpsc::Sender<Message>,
    inbox_rx: mpsc::Receiver<Message>,
    outstanding: usize,
}

impl ProcessContext {
    /// 创建通道并启动两棵树的列举任务和 `analyzers` 个分析任务
    pub fn spawn(
        source_root: &str,
        dest_root: &str,
        analyzers: usize,
        use_fingerprint: bool,
    ) -> Result<Self, SyncError> {
        let runtime = Handle::try_current().map_err(|e| SyncError::WorkerSpawnFailed {
            role: "coordinator".to_string(),
            reason: e.to_string(),
        })?;

        let analyzers = analyzers.max(1);
        let capacity = QUEUE_CAPACITY_PER_ANALYZER * analyzers;
        let (work_tx, work_rx) = mpsc::channel(capacity);
        let (inbox_tx, inbox_rx) = mpsc::channel(capacity);
        let work_rx = Arc::new(Mutex::new(work_rx));

        let mut roles: Vec<WorkerRole> = (0..analyzers)
            .map(|id| WorkerRole::Analyzer {
                id,
                use_fingerprint,
            })
            .collect();
        roles.push(WorkerRole::Lister {
            tree: TreeId::Source,
            root: source_root.to_string(),
        });
        roles.push(WorkerRole::Lister {
            tree: TreeId::Destination,
            root: dest_root.to_string(),
        });

        let mut workers = Vec::with_capacity(roles.len());
        for role in roles {
            let mut slot = WorkerSlot {
                role: role.clone(),
                state: WorkerState::Spawned,
                handle: None,
            };
            let inbox = inbox_tx.clone();
            let handle = match role {
                WorkerRole::Lister { tree, root } => {
                    let work = work_tx.clone();
                    runtime.spawn_blocking(move || run_lister(tree, root, work, inbox))
                }
                WorkerRole::Analyzer {
                    id,
                    use_fingerprint,
                } => {
                    let queue = work_rx.clone();
                    runtime.spawn(run_analyzer(id, use_fingerprint, queue, inbox))
                }
            };
            slot.handle = Some(handle);
            slot.state = WorkerState::Running;
            debug!("启动任务: {}", slot.role.label());
            workers.push(slot);
        }

        // 协调者不保留收件箱的发送端，所有任务退出后收件箱即关闭
        drop(inbox_tx);

        let outstanding = workers.len();
        info!("并行扫描: {} 个分析任务, 2 个列举任务", analyzers);

        Ok(Self {
            workers,
            work_tx,
            inbox_rx,
            outstanding,
        })
    }

    /// 仍在运行的任务数
    pub fn outstanding(&self) -> usize {
        self.outstanding
    }

    pub async fn recv(&mut self) -> Option<Message> {
        self.inbox_rx.recv().await
    }

    fn mark(&mut self, matches: impl Fn(&WorkerRole) -> bool, state: WorkerState) {
        for slot in self.workers.iter_mut().filter(|s| matches(&s.role)) {
            if slot.state != state {
                slot.state = state;
                if state == WorkerState::Terminating {
                    self.outstanding = self.outstanding.saturating_sub(1);
                }
            }
        }
    }

    fn lister_finished(&mut self, tree: TreeId) {
        self.mark(
            |role| matches!(role, WorkerRole::Lister { tree: t, .. } if *t == tree),
            WorkerState::Terminating,
        );
    }

    /// 关闭任务池：通知每个分析任务退出并等待确认，然后回收全部任务
    ///
    /// 没有超时，卡住的文件操作会一直阻塞到完成。
    pub async fn teardown(mut self) -> Result<(), SyncError> {
        let analyzers = self
            .workers
            .iter()
            .filter(|s| s.role.is_analyzer() && s.state == WorkerState::Running)
            .count();

        for _ in 0..analyzers {
            if self.work_tx.send(Message::Terminate).await.is_err() {
                break;
            }
        }
        self.mark(WorkerRole::is_analyzer, WorkerState::Terminating);

        let mut acked = 0;
        while acked < analyzers {
            match self.inbox_rx.recv().await {
                Some(Message::TerminateAck { worker }) => {
                    debug!("分析任务 {} 已确认退出", worker);
                    acked += 1;
                }
                Some(other) => debug!("关闭阶段忽略消息: {:?}", other),
                None => {
                    warn!("收件箱已关闭, 仅收到 {}/{} 个退出确认", acked, analyzers);
                    break;
                }
            }
        }

        let Self {
            mut workers,
            work_tx,
            inbox_rx,
            ..
        } = self;
        drop(work_tx);

        let handles: Vec<JoinHandle<()>> =
            workers.iter_mut().filter_map(|s| s.handle.take()).collect();
        let results = join_all(handles).await;
        drop(inbox_rx);

        let mut failure = None;
        for (slot, result) in workers.iter_mut().zip(results) {
            slot.state = WorkerState::Reaped;
            if let Err(e) = result {
                warn!("任务 {} 异常退出: {}", slot.role.label(), e);
                failure.get_or_insert(SyncError::WorkerFailed {
                    role: slot.role.label(),
                    reason: e.to_string(),
                });
            }
        }
        debug!("已回收 {} 个任务", workers.len());

        match failure {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}

/// 列举任务：遍历目录树，把每个路径放入工作队列
///
/// 无法构造条目的路径（遍历错误、路径过长）直接作为错误结果发给协调者，同样计入 `published`。
fn run_lister(
    tree: TreeId,
    root: String,
    work: mpsc::Sender<Message>,
    inbox: mpsc::Sender<Message>,
) {
    let walker = TreeWalker::new(&root);
    let mut published = 0usize;

    for item in walker.walk() {
        let sent = match item.and_then(|relative| InventoryEntry::new(&root, &relative)) {
            Ok(entry) => work.blocking_send(Message::Path { tree, entry }),
            Err(e) => inbox.blocking_send(Message::Result {
                tree,
                outcome: Err(e),
            }),
        };
        if sent.is_err() {
            debug!("列举任务 {} 的通道已关闭", tree);
            return;
        }
        published += 1;
    }

    debug!("列举完成: {} ({} 个条目)", tree, published);
    let _ = inbox.blocking_send(Message::EndOfStream { tree, published });
}

/// 分析任务：从共享队列取路径并探测，直到收到 `Terminate`
async fn run_analyzer(
    id: usize,
    use_fingerprint: bool,
    queue: Arc<Mutex<mpsc::Receiver<Message>>>,
    inbox: mpsc::Sender<Message>,
) {
    loop {
        let message = {
            let mut rx = queue.lock().await;
            rx.recv().await
        };

        match message {
            Some(Message::Path { tree, mut entry }) => {
                let outcome = tokio::task::spawn_blocking(move || {
                    let attrs = probe(entry.full_path(), use_fingerprint)?;
                    entry.set_attributes(attrs);
                    Ok(entry)
                })
                .await
                .unwrap_or_else(|e| {
                    Err(SyncError::WorkerFailed {
                        role: format!("analyzer-{}", id),
                        reason: e.to_string(),
                    })
                });

                if inbox.send(Message::Result { tree, outcome }).await.is_err() {
                    break;
                }
            }
            Some(Message::Terminate) => {
                let _ = inbox.send(Message::TerminateAck { worker: id }).await;
                break;
            }
            Some(other) => debug!("分析任务 {} 忽略消息: {:?}", id, other),
            None => break,
        }
    }
    debug!("分析任务 {} 退出", id);
}

/// 并行构建源树和目标树的清单
pub async fn scan_parallel(
    source_root: &str,
    dest_root: &str,
    analyzers: usize,
    use_fingerprint: bool,
) -> Result<(ScanOutcome, ScanOutcome), SyncError> {
    let mut context = ProcessContext::spawn(source_root, dest_root, analyzers, use_fingerprint)?;

    let mut outcomes = [
        ScanOutcome {
            inventory: FileInventory::new(source_root),
            failures: Vec::new(),
        },
        ScanOutcome {
            inventory: FileInventory::new(dest_root),
            failures: Vec::new(),
        },
    ];
    let mut received = [0usize; 2];
    let mut expected: [Option<usize>; 2] = [None, None];

    let collected = loop {
        let complete = TreeId::ALL
            .iter()
            .all(|t| expected[t.index()] == Some(received[t.index()]));
        if complete {
            break true;
        }

        match context.recv().await {
            Some(Message::Result { tree, outcome }) => {
                received[tree.index()] += 1;
                let slot = &mut outcomes[tree.index()];
                match outcome {
                    Ok(entry) => {
                        let (_, created) = slot.inventory.insert_entry(entry);
                        if !created {
                            debug!("重复条目已忽略 ({})", tree);
                        }
                    }
                    Err(e) => {
                        warn!("探测失败 [{}] ({}): {}", e.kind(), tree, e);
                        slot.failures.push(e);
                    }
                }
            }
            Some(Message::EndOfStream { tree, published }) => {
                debug!("收到结束标记: {} ({} 个条目)", tree, published);
                expected[tree.index()] = Some(published);
                context.lister_finished(tree);
            }
            Some(other) => debug!("协调者忽略消息: {:?}", other),
            None => break false,
        }
    };

    debug!("结果汇总完成, 剩余 {} 个任务", context.outstanding());
    context.teardown().await?;

    if !collected {
        return Err(SyncError::ChannelFailed("收件箱在结果汇总完成前关闭"));
    }

    let [source, destination] = outcomes;
    info!(
        "并行扫描完成: 源 {} 个条目, 目标 {} 个条目",
        source.inventory.len(),
        destination.inventory.len()
    );
    Ok((source, destination))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::scanner::scan_tree;
    use std::fs;

    fn populate(root: &std::path::Path, dirs: usize, files_per_dir: usize) {
        for d in 0..dirs {
            let dir = root.join(format!("dir{}", d));
            fs::create_dir(&dir).unwrap();
            for f in 0..files_per_dir {
                fs::write(dir.join(format!("file{}.txt", f)), format!("{}-{}", d, f)).unwrap();
            }
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn parallel_scan_matches_serial_scan() {
        let source = tempfile::tempdir().unwrap();
        let dest = tempfile::tempdir().unwrap();
        populate(source.path(), 5, 20);
        populate(dest.path(), 2, 3);
        let source_root = source.path().to_str().unwrap();
        let dest_root = dest.path().to_str().unwrap();

        let (parallel_src, parallel_dst) = scan_parallel(source_root, dest_root, 4, true)
            .await
            .unwrap();
        let serial_src = scan_tree(source_root, true);
        let serial_dst = scan_tree(dest_root, true);

        assert_eq!(parallel_src.inventory.len(), 105);
        assert!(parallel_src.inventory.is_sorted());
        assert!(parallel_src
            .inventory
            .iter()
            .eq(serial_src.inventory.iter()));
        assert!(parallel_dst
            .inventory
            .iter()
            .eq(serial_dst.inventory.iter()));
        assert!(parallel_src.failures.is_empty());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn empty_trees_finish_cleanly() {
        let source = tempfile::tempdir().unwrap();
        let dest = tempfile::tempdir().unwrap();

        let (src, dst) = scan_parallel(
            source.path().to_str().unwrap(),
            dest.path().to_str().unwrap(),
            2,
            false,
        )
        .await
        .unwrap();
        assert!(src.inventory.is_empty());
        assert!(dst.inventory.is_empty());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn missing_root_is_reported_per_tree() {
        let source = tempfile::tempdir().unwrap();
        fs::write(source.path().join("a.txt"), b"a").unwrap();
        let missing = source.path().join("missing");

        let (src, dst) = scan_parallel(
            source.path().to_str().unwrap(),
            missing.to_str().unwrap(),
            2,
            true,
        )
        .await
        .unwrap();
        assert_eq!(src.inventory.len(), 1);
        assert!(dst.inventory.is_empty());
        assert_eq!(dst.failures.len(), 1);
    }

    #[test]
    fn spawn_without_runtime_fails() {
        let err = ProcessContext::spawn("/src", "/dst", 2, true)
            .err()
            .unwrap();
        assert!(matches!(err, SyncError::WorkerSpawnFailed { .. }));
    }

    #[test]
    fn role_labels() {
        let lister = WorkerRole::Lister {
            tree: TreeId::Destination,
            root: "/dst".into(),
        };
        assert_eq!(lister.label(), "lister-destination");
        let analyzer = WorkerRole::Analyzer {
            id: 3,
            use_fingerprint: true,
        };
        assert_eq!(analyzer.label(), "analyzer-3");
    }
}
