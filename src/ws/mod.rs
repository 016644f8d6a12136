pub mod capabilities;
pub mod close_code;
pub mod connctx;
pub mod docctx;
pub mod error;
pub mod gateway;
pub mod liveness;
pub mod persistence;
pub mod presence;
pub mod registry;
pub mod relay;
pub mod room;
#[cfg(test)]
pub(crate) mod testing;
