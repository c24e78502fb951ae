// Administrative calls on the service's remote-call surface
//
// Every request starts with the ADMIN_DESCRIPTOR interface token. Every reply
// starts with a status word (0 = ok) followed by the result, if any.

use super::{HmaService, ServiceError};
use crate::relay::{Parcel, TransactError};

/// Interface token of administrative requests.
pub const ADMIN_DESCRIPTOR: &str = "hma.service.IHMAService";

const STATUS_OK: i32 = 0;

/// Administrative operations, by call code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdminCode {
    /// `bool clean_env` → nothing
    StopService = 1,
    /// → `u32`
    GetServiceVersion = 2,
    /// → `u64`
    GetFilterCount = 3,
    /// → string
    GetLogs = 4,
    /// → nothing
    ClearLogs = 5,
    /// `string json` → `bool applied`
    SyncConfig = 6,
    /// → string
    GetHookType = 7,
}

impl AdminCode {
    pub fn from_code(code: u32) -> Option<Self> {
        Some(match code {
            1 => AdminCode::StopService,
            2 => AdminCode::GetServiceVersion,
            3 => AdminCode::GetFilterCount,
            4 => AdminCode::GetLogs,
            5 => AdminCode::ClearLogs,
            6 => AdminCode::SyncConfig,
            7 => AdminCode::GetHookType,
            _ => return None,
        })
    }

    pub fn code(self) -> u32 {
        self as u32
    }

    /// Start a request frame for this operation.
    pub fn request(self) -> Result<Parcel, TransactError> {
        let mut parcel = Parcel::new();
        parcel.write_interface_token(ADMIN_DESCRIPTOR)?;
        Ok(parcel)
    }
}

pub(crate) fn dispatch(
    service: &HmaService,
    code: u32,
    data: &mut Parcel,
    reply: Option<&mut Parcel>,
    _flags: u32,
) -> Result<bool, TransactError> {
    let Some(op) = AdminCode::from_code(code) else {
        return Ok(false);
    };
    data.enforce_interface(ADMIN_DESCRIPTOR)?;

    let mut out = Parcel::new();
    out.write_i32(STATUS_OK);
    match op {
        AdminCode::StopService => {
            let clean_env = data.read_bool()?;
            service.stop_service(clean_env).map_err(remote)?;
        }
        AdminCode::GetServiceVersion => out.write_u32(service.service_version()),
        AdminCode::GetFilterCount => out.write_u64(service.filter_count()),
        AdminCode::GetLogs => {
            let logs = service.get_logs().map_err(remote)?;
            out.write_string(Some(&logs))?;
        }
        AdminCode::ClearLogs => service.clear_logs().map_err(remote)?,
        AdminCode::SyncConfig => {
            let json = data.read_string()?.unwrap_or_default();
            let outcome = service.sync_config(&json).map_err(remote)?;
            out.write_bool(outcome.is_applied());
        }
        AdminCode::GetHookType => out.write_string(Some(service.hook_type()))?,
    }

    if let Some(reply) = reply {
        reply.append_from(&out, 0, out.data_size())?;
    }
    Ok(true)
}

fn remote(e: ServiceError) -> TransactError {
    TransactError::Remote(e.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_codes_round_trip() {
        for code in 1..=7 {
            assert_eq!(AdminCode::from_code(code).map(AdminCode::code), Some(code));
        }
        assert_eq!(AdminCode::from_code(0), None);
        assert_eq!(AdminCode::from_code(8), None);
    }

    #[test]
    fn test_request_carries_descriptor() {
        let mut request = AdminCode::GetLogs.request().unwrap();
        request.enforce_interface(ADMIN_DESCRIPTOR).unwrap();
    }
}
