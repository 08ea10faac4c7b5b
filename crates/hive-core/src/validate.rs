//! Entity validation applied after wrapper fields are merged and before
//! anything is sent to the backend.

use crate::error::{Error, Result};
use crate::model::{Command, Notification};

const MAX_NAME_LEN: usize = 128;
const MAX_STATUS_LEN: usize = 128;

/// Something that can be checked for consistency before it is sent.
pub trait Validate {
    fn validate(&self) -> Result<()>;
}

fn check_name(field: &str, value: Option<&str>) -> Result<()> {
    match value {
        None => Err(Error::ValidationFailed(format!("{field} is required"))),
        Some(v) if v.trim().is_empty() => {
            Err(Error::ValidationFailed(format!("{field} cannot be empty")))
        }
        Some(v) if v.chars().count() > MAX_NAME_LEN => Err(Error::ValidationFailed(format!(
            "{field} cannot be longer than {MAX_NAME_LEN} characters"
        ))),
        Some(_) => Ok(()),
    }
}

impl Validate for Command {
    fn validate(&self) -> Result<()> {
        if self.device_guid.is_empty() {
            return Err(Error::ValidationFailed("deviceGuid is required".into()));
        }
        check_name("command", self.command.as_deref())?;
        if let Some(lifetime) = self.lifetime
            && lifetime < 0
        {
            return Err(Error::ValidationFailed(
                "lifetime cannot be negative".into(),
            ));
        }
        if let Some(status) = &self.status
            && status.chars().count() > MAX_STATUS_LEN
        {
            return Err(Error::ValidationFailed(format!(
                "status cannot be longer than {MAX_STATUS_LEN} characters"
            )));
        }
        Ok(())
    }
}

impl Validate for Notification {
    fn validate(&self) -> Result<()> {
        if self.device_guid.is_empty() {
            return Err(Error::ValidationFailed("deviceGuid is required".into()));
        }
        check_name("notification", Some(&self.notification))
    }
}
