use crate::{batch::SealedBatch, error::InternalError, value::Value};
use async_trait::async_trait;

///
/// ReturnedRow
///
/// Store-generated values for the intent at `position` within its batch,
/// ordered like that intent's read columns.
///

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ReturnedRow {
    pub position: usize,
    pub values: Vec<Value>,
}

///
/// BatchResult
///

#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct BatchResult {
    pub rows_affected: usize,
    pub returned: Vec<ReturnedRow>,
}

impl BatchResult {
    #[must_use]
    pub const fn affected(rows_affected: usize) -> Self {
        Self {
            rows_affected,
            returned: Vec::new(),
        }
    }

    #[must_use]
    pub fn with_returned(mut self, position: usize, values: Vec<Value>) -> Self {
        self.returned.push(ReturnedRow { position, values });
        self
    }
}

///
/// BatchRunner
///
/// Store adapter that renders one sealed batch into a single round-trip on
/// connection `C` and reports the rows it affected. Faults are reported as
/// [`InternalError::store`] so the retry layer can classify them.
///

pub trait BatchRunner<C: ?Sized> {
    fn run(&self, batch: &SealedBatch, connection: &mut C) -> Result<BatchResult, InternalError>;
}

///
/// AsyncBatchRunner
///

#[async_trait]
pub trait AsyncBatchRunner<C: Send + ?Sized>: Send + Sync {
    async fn run(
        &self,
        batch: &SealedBatch,
        connection: &mut C,
    ) -> Result<BatchResult, InternalError>;
}
