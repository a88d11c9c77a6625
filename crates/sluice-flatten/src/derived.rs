//! Shorthands over `FlattenBuilder` with the default config.
//!
//! The `*_all` forms take source values that already are sub-streams (a
//! `Vec`, an `Outbound`, a `SubStream`) and flatten them as they are.

use sluice_core::error::{Reason, Result};
use sluice_core::id::ActivationId;
use sluice_source::SubStream;

use crate::builder::{FlattenBuilder, FlattenStage};

pub fn merge_map<T, U, S, F>(limit: Option<usize>, projector: F) -> Result<FlattenStage<T, U>>
where
    T: Send + 'static,
    U: Send + 'static,
    S: Into<SubStream<U>>,
    F: FnMut(T, ActivationId) -> std::result::Result<S, Reason> + Send + 'static,
{
    FlattenBuilder::merge(limit).projector(projector).build()
}

/// Merge with a limit of one: sub-streams are drained strictly in order.
pub fn concat_map<T, U, S, F>(projector: F) -> Result<FlattenStage<T, U>>
where
    T: Send + 'static,
    U: Send + 'static,
    S: Into<SubStream<U>>,
    F: FnMut(T, ActivationId) -> std::result::Result<S, Reason> + Send + 'static,
{
    merge_map(Some(1), projector)
}

pub fn switch_map<T, U, S, F>(projector: F) -> Result<FlattenStage<T, U>>
where
    T: Send + 'static,
    U: Send + 'static,
    S: Into<SubStream<U>>,
    F: FnMut(T, ActivationId) -> std::result::Result<S, Reason> + Send + 'static,
{
    FlattenBuilder::switch().projector(projector).build()
}

pub fn exhaust_map<T, U, S, F>(projector: F) -> Result<FlattenStage<T, U>>
where
    T: Send + 'static,
    U: Send + 'static,
    S: Into<SubStream<U>>,
    F: FnMut(T, ActivationId) -> std::result::Result<S, Reason> + Send + 'static,
{
    FlattenBuilder::exhaust().projector(projector).build()
}

fn identity<S>(source: S, _: ActivationId) -> std::result::Result<S, Reason> {
    Ok(source)
}

pub fn merge_all<S, U>(limit: Option<usize>) -> Result<FlattenStage<S, U>>
where
    S: Into<SubStream<U>> + Send + 'static,
    U: Send + 'static,
{
    merge_map(limit, identity::<S>)
}

pub fn concat_all<S, U>() -> Result<FlattenStage<S, U>>
where
    S: Into<SubStream<U>> + Send + 'static,
    U: Send + 'static,
{
    concat_map(identity::<S>)
}

pub fn switch_all<S, U>() -> Result<FlattenStage<S, U>>
where
    S: Into<SubStream<U>> + Send + 'static,
    U: Send + 'static,
{
    switch_map(identity::<S>)
}

pub fn exhaust_all<S, U>() -> Result<FlattenStage<S, U>>
where
    S: Into<SubStream<U>> + Send + 'static,
    U: Send + 'static,
{
    exhaust_map(identity::<S>)
}
