//! IdGenerator port - ID 生成の抽象化
//!
//! # 実装
//! - **UlidGenerator**: ULID ベース（本番用）

use std::sync::Arc;

use ulid::Ulid;

use crate::domain::ids::{Id, IdMarker};
use crate::ports::Clock;

/// IdGenerator は分散環境で使える ID を生成
///
/// trait object のまま使えるように、型付きの ID は
/// `<dyn IdGenerator>::next_id::<T>()` で取り出します。
pub trait IdGenerator: Send + Sync {
    fn next_ulid(&self) -> Ulid;
}

impl dyn IdGenerator {
    pub fn next_id<T: IdMarker>(&self) -> Id<T> {
        Id::from_ulid(self.next_ulid())
    }
}

/// UlidGenerator は Clock の時刻で ULID を生成
///
/// FixedClock を渡すと timestamp 部分が決定的になります。
pub struct UlidGenerator {
    clock: Arc<dyn Clock>,
}

impl UlidGenerator {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self { clock }
    }
}

impl IdGenerator for UlidGenerator {
    fn next_ulid(&self) -> Ulid {
        let timestamp_ms = self.clock.now().timestamp_millis() as u64;
        Ulid::from_parts(timestamp_ms, rand::random())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{TaskId, ReviewId};
    use crate::ports::{FixedClock, SystemClock};
    use chrono::{TimeZone, Utc};

    #[test]
    fn ulid_generator_generates_unique_ids() {
        let id_gen: Arc<dyn IdGenerator> = Arc::new(UlidGenerator::new(Arc::new(SystemClock)));

        let id1: TaskId = id_gen.next_id();
        let id2: TaskId = id_gen.next_id();
        assert_ne!(id1, id2);
    }

    #[test]
    fn ulid_generator_with_fixed_clock_stamps_its_time() {
        let fixed_time = Utc.with_ymd_and_hms(2024, 1, 1, 12, 0, 0).unwrap();
        let id_gen: Arc<dyn IdGenerator> =
            Arc::new(UlidGenerator::new(Arc::new(FixedClock::new(fixed_time))));

        let id1: ReviewId = id_gen.next_id();
        let id2: ReviewId = id_gen.next_id();

        // ランダム部分があるので ID は異なるが、timestamp 部分は同じ
        assert_ne!(id1, id2);
        assert_eq!(id1.as_ulid().timestamp_ms(), fixed_time.timestamp_millis() as u64);
        assert_eq!(id2.as_ulid().timestamp_ms(), fixed_time.timestamp_millis() as u64);
    }
}
