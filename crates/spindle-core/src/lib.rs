//! spindle-core
//!
//! Core building blocks for the Spindle statement pool: a small fixed set of
//! worker execution contexts, each holding its own exclusive connection to a
//! shared SQLite store, fed one statement at a time by a single dispatcher.
//!
//! # モジュール構成
//! - **domain**: ドメインモデル（ids, statement, task, outcome）
//! - **ports**: 抽象化レイヤー（Clock, IdGenerator）
//! - **store**: SQLite 接続と文の実行（per-worker shim）
//! - **pool**: dispatcher, worker threads, correlation registry
//!
//! The dispatcher owns every piece of mutable pool state (slot statuses,
//! backlog, registry) behind one actor loop; workers talk to it exclusively
//! via messages.

pub mod domain;
pub mod error;
pub mod pool;
pub mod ports;
pub mod store;
