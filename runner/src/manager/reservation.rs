use super::{CaseManager, ManagerError};
use crate::{case::Case, repository::transfer::TransferReport};
use std::ops::{Deref, DerefMut};
use tracing::debug;

/// A staged case that gets released on drop unless its results were published
///
/// This covers every early return and unwinding path between reserving and publishing, so a
/// failing job never leaves its case claimed.
#[derive(Debug)]
pub struct Reservation<'a> {
    manager: &'a CaseManager,
    case: Case,
    published: bool,
}

impl<'a> Reservation<'a> {
    pub fn new(manager: &'a CaseManager, case: Case) -> Self {
        Self {
            manager,
            case,
            published: false,
        }
    }

    /// publish the results, on failure the case is released when the guard drops
    pub fn publish(mut self) -> Result<TransferReport, ManagerError> {
        let report = self.manager.publish_result(&mut self.case)?;
        self.published = true;

        Ok(report)
    }
}

impl Drop for Reservation<'_> {
    fn drop(&mut self) {
        // only undo our own marker, unlocked pulls never wrote one
        if !self.published && self.case.reserved {
            self.manager.abandon(&mut self.case);
        } else {
            debug!(case = %self.case.name, "Dropping reservation without release");
        }
    }
}

impl Deref for Reservation<'_> {
    type Target = Case;

    fn deref(&self) -> &Self::Target {
        &self.case
    }
}

impl DerefMut for Reservation<'_> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.case
    }
}
