use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use tokio::sync::watch;
use uuid::Uuid;

/// ControlSignal は実行中のランナーへ送る協調的な制御シグナル。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlSignal {
    Continue,
    Pause,
    Cancel,
}

impl std::fmt::Display for ControlSignal {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Continue => write!(f, "continue"),
            Self::Pause => write!(f, "pause"),
            Self::Cancel => write!(f, "cancel"),
        }
    }
}

struct Slot {
    generation: u64,
    sender: watch::Sender<ControlSignal>,
}

#[derive(Default)]
struct Slots {
    next_generation: u64,
    active: HashMap<Uuid, Slot>,
}

/// ExecutionRegistry はジョブごとに高々 1 つの実行を保証するプロセス内レジストリ。
/// シグナルの送信と実行の解放は同じロックの下で行い、ロックを await をまたいで保持しない。
#[derive(Default)]
pub struct ExecutionRegistry {
    slots: Mutex<Slots>,
}

impl ExecutionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Slots> {
        self.slots
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    /// 実行が無ければリースを返す。既に実行中の場合は Continue を送って None を返し、
    /// 停止しかけているランナーにそのまま処理を続けさせる。
    pub fn begin_or_continue(self: &Arc<Self>, job_id: Uuid) -> Option<ExecutionLease> {
        let mut slots = self.lock();
        if let Some(slot) = slots.active.get(&job_id) {
            slot.sender.send_replace(ControlSignal::Continue);
            return None;
        }

        slots.next_generation += 1;
        let generation = slots.next_generation;
        let (sender, receiver) = watch::channel(ControlSignal::Continue);
        slots.active.insert(job_id, Slot { generation, sender });

        Some(ExecutionLease {
            registry: Arc::clone(self),
            job_id,
            generation,
            receiver,
            released: false,
        })
    }

    /// 実行中のランナーにシグナルを送る。実行が無ければ false。
    pub fn signal(&self, job_id: Uuid, signal: ControlSignal) -> bool {
        let slots = self.lock();
        match slots.active.get(&job_id) {
            Some(slot) => {
                slot.sender.send_replace(signal);
                true
            }
            None => false,
        }
    }

    pub fn is_active(&self, job_id: Uuid) -> bool {
        self.lock().active.contains_key(&job_id)
    }

    fn remove(&self, job_id: Uuid, generation: u64) {
        let mut slots = self.lock();
        if slots
            .active
            .get(&job_id)
            .is_some_and(|slot| slot.generation == generation)
        {
            slots.active.remove(&job_id);
        }
    }
}

/// ExecutionLease は 1 つのジョブ実行の占有権。drop 時にレジストリから外れる。
pub struct ExecutionLease {
    registry: Arc<ExecutionRegistry>,
    job_id: Uuid,
    generation: u64,
    receiver: watch::Receiver<ControlSignal>,
    released: bool,
}

impl ExecutionLease {
    pub fn job_id(&self) -> Uuid {
        self.job_id
    }

    /// 前回の確認以降に届いたシグナルを取り出す。
    pub fn take_signal(&mut self) -> Option<ControlSignal> {
        match self.receiver.has_changed() {
            Ok(true) => Some(*self.receiver.borrow_and_update()),
            _ => None,
        }
    }

    /// 前回の確認以降に新しいシグナルが届いていなければ実行を解放して true を返す。
    /// 届いていた場合（再開要求など）は解放せず false を返す。
    pub fn try_release(&mut self) -> bool {
        let mut slots = self.registry.lock();
        if self.receiver.has_changed().unwrap_or(false) {
            return false;
        }
        if slots
            .active
            .get(&self.job_id)
            .is_some_and(|slot| slot.generation == self.generation)
        {
            slots.active.remove(&self.job_id);
        }
        self.released = true;
        true
    }
}

impl Drop for ExecutionLease {
    fn drop(&mut self) {
        if !self.released {
            self.registry.remove(self.job_id, self.generation);
        }
    }
}
