//! 단일 비행(single-flight) 비동기 작업.
//!
//! 진행 중인 작업이 있으면 새 호출자는 같은 작업을 기다려 결과를 공유합니다.
//! 작업은 별도 태스크로 실행되므로 기다리던 호출자가 모두 떠나도 끝까지 진행되고,
//! 끝나는 시점에 태스크가 직접 슬롯을 비웁니다.
//! 슬롯 잠금은 작업을 등록/복제하는 동안에만 잡히며, 대기 중에는 잡히지 않습니다.

use futures::future::{BoxFuture, FutureExt, Shared};
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

type Inflight<T> = (u64, Shared<BoxFuture<'static, T>>);
type Slot<T> = Arc<Mutex<Option<Inflight<T>>>>;

fn lock_slot<T>(slot: &Mutex<Option<Inflight<T>>>) -> MutexGuard<'_, Option<Inflight<T>>> {
    // 잠금 구간에서 패닉이 나도 슬롯 상태는 일관적이므로 그대로 사용
    slot.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// 작업 태스크가 끝나거나(패닉/취소 포함) 사라질 때 자기 슬롯을 비웁니다.
struct ClearOnDrop<T> {
    slot: Slot<T>,
    id: u64,
}

impl<T> Drop for ClearOnDrop<T> {
    fn drop(&mut self) {
        let mut slot = lock_slot(&self.slot);
        if matches!(slot.as_ref(), Some((current, _)) if *current == self.id) {
            *slot = None;
        }
    }
}

/// 한 번에 하나의 작업만 진행시키는 조정자.
///
/// `run`은 tokio 런타임 안에서 호출해야 합니다.
pub struct SingleFlight<T: Clone> {
    slot: Slot<T>,
    next_id: AtomicU64,
}

impl<T> SingleFlight<T>
where
    T: Clone + Send + Sync + 'static,
{
    pub fn new() -> Self {
        Self {
            slot: Arc::new(Mutex::new(None)),
            next_id: AtomicU64::new(1),
        }
    }

    /// 진행 중인 작업에 합류하거나, 없으면 `start`로 새 작업을 시작합니다.
    ///
    /// 호출자가 기다리기를 그만둬도(타임아웃 등) 작업은 끝까지 실행됩니다.
    /// 작업이 끝나면 슬롯이 비워지므로 다음 호출은 새 작업을 시작합니다.
    pub async fn run<F, Fut>(&self, start: F) -> T
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = T> + Send + 'static,
    {
        let future = {
            let mut slot = lock_slot(&self.slot);
            match slot.as_ref() {
                Some((_, future)) => future.clone(),
                None => {
                    let id = self.next_id.fetch_add(1, Ordering::Relaxed);
                    let guard = ClearOnDrop {
                        slot: Arc::clone(&self.slot),
                        id,
                    };
                    let work = start();
                    let handle = tokio::spawn(async move {
                        let output = work.await;
                        drop(guard);
                        output
                    });
                    let future = async move {
                        match handle.await {
                            Ok(output) => output,
                            Err(err) if err.is_panic() => {
                                std::panic::resume_unwind(err.into_panic())
                            }
                            Err(err) => panic!("single-flight 작업이 취소되었습니다: {}", err),
                        }
                    }
                    .boxed()
                    .shared();
                    *slot = Some((id, future.clone()));
                    future
                }
            }
        };

        future.await
    }

    /// 진행 중인 작업이 있는지 확인합니다.
    pub fn is_pending(&self) -> bool {
        lock_slot(&self.slot).is_some()
    }

    /// 진행 중인 작업을 슬롯에서 떼어냅니다.
    ///
    /// 작업 자체를 멈추지는 않습니다. 이미 실행 중인 태스크는 끝까지 진행되고,
    /// 이미 합류한 호출자는 그 결과를 받습니다. 이후 호출은 새 작업을 시작합니다.
    pub fn forget(&self) {
        lock_slot(&self.slot).take();
    }
}

impl<T> Default for SingleFlight<T>
where
    T: Clone + Send + Sync + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}
