use tracing::debug;

use super::Driver;
use crate::errors::EntGraphError;

/// Transaction scope with automatic rollback on drop.
///
/// The outermost guard issues `BEGIN IMMEDIATE`; a guard opened while a
/// transaction is already active nests as a savepoint, so an inner failure
/// rolls back only the inner work.
pub struct TxGuard<'a> {
    driver: &'a Driver,
    savepoint: Option<String>,
    done: bool,
}

impl<'a> TxGuard<'a> {
    pub(crate) fn begin(driver: &'a Driver) -> Result<Self, EntGraphError> {
        let savepoint = if driver.conn.is_autocommit() {
            driver.raw_execute("BEGIN IMMEDIATE")?;
            debug!("transaction begin");
            None
        } else {
            let name = driver.next_savepoint();
            driver.raw_execute(&format!("SAVEPOINT {name}"))?;
            debug!(savepoint = %name, "savepoint begin");
            Some(name)
        };
        Ok(Self {
            driver,
            savepoint,
            done: false,
        })
    }

    pub fn driver(&self) -> &'a Driver {
        self.driver
    }

    pub fn is_nested(&self) -> bool {
        self.savepoint.is_some()
    }

    pub fn commit(mut self) -> Result<(), EntGraphError> {
        match &self.savepoint {
            None => {
                self.driver.raw_execute("COMMIT")?;
                debug!("transaction commit");
            }
            Some(name) => {
                self.driver.raw_execute(&format!("RELEASE {name}"))?;
                debug!(savepoint = %name, "savepoint release");
            }
        }
        self.done = true;
        Ok(())
    }

    pub fn rollback(mut self) -> Result<(), EntGraphError> {
        self.done = true;
        self.undo()
    }

    fn undo(&self) -> Result<(), EntGraphError> {
        match &self.savepoint {
            // A failed statement may already have ended the transaction.
            None if self.driver.conn.is_autocommit() => Ok(()),
            None => {
                debug!("transaction rollback");
                self.driver.raw_execute("ROLLBACK")
            }
            Some(name) => {
                debug!(savepoint = %name, "savepoint rollback");
                self.driver
                    .raw_execute(&format!("ROLLBACK TO {name}; RELEASE {name}"))
            }
        }
    }
}

impl Drop for TxGuard<'_> {
    fn drop(&mut self) {
        if !self.done {
            let _ = self.undo();
        }
    }
}
