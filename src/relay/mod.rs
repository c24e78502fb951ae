//! Privileged call relay.
//!
//! A less privileged caller may hold a reference to a target it cannot invoke
//! itself. It wraps the call in a [`RELAY_TRANSACTION`] frame addressed to this
//! service, which unwraps it and performs the call with its own privileges:
//!
//! ```text
//! [interface token RELAY_DESCRIPTOR][target ref][code: u32][flags: u32][sub-frame bytes...]
//! ```
//!
//! The relay adds no policy of its own. The target's result, reply contents and
//! errors are passed back untouched.

pub mod parcel;

pub use parcel::{CallTarget, Parcel, TransactError};

use std::sync::Arc;

/// Reserved call code for wrapped calls (`"_HMA"`).
pub const RELAY_TRANSACTION: u32 = u32::from_be_bytes(*b"_HMA");

/// Interface token expected at the start of a wrapped call.
pub const RELAY_DESCRIPTOR: &str = "hma.service.RemoteCallRelay";

/// Decoded header of a wrapped call.
struct WrappedCall {
    target: Arc<dyn CallTarget>,
    code: u32,
    flags: u32,
}

/// Unwraps and re-dispatches [`RELAY_TRANSACTION`] frames.
#[derive(Debug, Default, Clone, Copy)]
pub struct CallRelay;

impl CallRelay {
    pub fn new() -> Self {
        Self
    }

    /// Whether `code` is addressed to the relay.
    pub fn handles(&self, code: u32) -> bool {
        code == RELAY_TRANSACTION
    }

    /// Relay the call wrapped in `data`.
    ///
    /// The sub-frame is copied into a parcel owned by this call, which is
    /// dropped on every return path. Failures are logged and returned as-is.
    pub fn relay(
        &self,
        data: &mut Parcel,
        reply: Option<&mut Parcel>,
    ) -> Result<bool, TransactError> {
        tracing::info!("remote binder wrapper transact");
        let call = Self::decode(data).inspect_err(|e| {
            tracing::error!("something wrong happened while decoding wrapped call: {}", e);
        })?;

        let binder = call.target.describe();
        tracing::info!("binder={} code={} flags={}", binder, call.code, call.flags);
        Self::forward(&call, data, reply).inspect_err(|e| {
            tracing::error!(
                binder = %binder,
                code = call.code,
                flags = call.flags,
                "something wrong happened: {}",
                e
            );
        })
    }

    fn forward(
        call: &WrappedCall,
        data: &Parcel,
        reply: Option<&mut Parcel>,
    ) -> Result<bool, TransactError> {
        let mut sub = Parcel::new();
        sub.append_from(data, data.data_position(), data.data_avail())?;
        call.target.transact(call.code, &mut sub, reply, call.flags)
    }

    fn decode(data: &mut Parcel) -> Result<WrappedCall, TransactError> {
        data.enforce_interface(RELAY_DESCRIPTOR)?;
        let target = data.read_target()?.ok_or(TransactError::NullTarget)?;
        let code = data.read_u32()?;
        let flags = data.read_u32()?;
        Ok(WrappedCall {
            target,
            code,
            flags,
        })
    }
}

/// Build a [`RELAY_TRANSACTION`] frame wrapping `inner` for `target`.
pub fn wrap_call(
    target: Arc<dyn CallTarget>,
    code: u32,
    flags: u32,
    inner: &Parcel,
) -> Result<Parcel, TransactError> {
    let mut frame = Parcel::new();
    frame.write_interface_token(RELAY_DESCRIPTOR)?;
    frame.write_target(Some(target));
    frame.write_u32(code);
    frame.write_u32(flags);
    frame.append_from(inner, 0, inner.data_size())?;
    Ok(frame)
}
