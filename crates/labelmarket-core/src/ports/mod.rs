//! Ports - 抽象化レイヤー
//!
//! Hexagonal Architecture の「ポート」を定義します。
//! ストレージ・時刻・乱数はすべてここを経由するので、
//! コアのロジックは実装の詳細を知りません。

pub mod clock;
pub mod entity_store;
pub mod id_generator;
pub mod token;

pub use self::clock::{Clock, FixedClock, SystemClock};
pub use self::entity_store::{EntityStore, ReviewFilter, StoreTx, TaskFilter};
pub use self::id_generator::{IdGenerator, UlidGenerator};
pub use self::token::{RandomTokenGenerator, TokenGenerator};
