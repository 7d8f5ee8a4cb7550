//! `oad_train` の補助モジュール

pub mod structured;
