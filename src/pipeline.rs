//! Batched recovery pipeline
//!
//! Calling the coding engine once per input slice pays its fixed setup cost
//! (table construction, thread fan-out) every time. [`BatchPipeline`] copies
//! inputs into a staging table and only calls the engine when the table is
//! full, or when the caller flushes. The result is identical to unbatched
//! generation because recovery data is a plain sum of per-slice terms.
//!
//! The pipeline is shared by [`crate::Par2`] (unit = slice size) and
//! [`crate::Par2Chunked`] (unit = chunk size). It does not own the recovery
//! buffers; each call borrows them from the producer.

use crate::config::DEFAULT_BATCH_SIZE;
use crate::domain::GlobalSliceIndex;
use crate::engine::{AlignedBuffer, RecoveryEngine};
use crate::error::{Par2Error, Result};
use log::{debug, trace};
use smallvec::SmallVec;

/// Staging table feeding a [`RecoveryEngine`]
#[derive(Debug)]
pub struct BatchPipeline {
    capacity: usize,
    staging: Vec<AlignedBuffer>,
    indices: SmallVec<[u32; DEFAULT_BATCH_SIZE]>,
    unit_len: usize,
    merge: bool,
}

impl Default for BatchPipeline {
    fn default() -> Self {
        Self::new(DEFAULT_BATCH_SIZE)
    }
}

impl BatchPipeline {
    /// Pipeline issuing one engine call per `capacity` inputs
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            staging: Vec::new(),
            indices: SmallVec::new(),
            unit_len: 0,
            merge: false,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Inputs waiting for the next engine call
    pub fn staged(&self) -> usize {
        self.indices.len()
    }

    /// Whether the next engine call accumulates into the outputs
    pub fn is_merging(&self) -> bool {
        self.merge
    }

    /// Stage one input, calling the engine if the batch is now full
    ///
    /// `data` may be shorter than `unit_len`; the rest of its staging slot is
    /// zero filled. A zero `unit_len` makes this a no-op.
    pub fn enqueue<E: RecoveryEngine + ?Sized>(
        &mut self,
        engine: &E,
        data: &[u8],
        slice: GlobalSliceIndex,
        unit_len: usize,
        outputs: &mut [&mut [u8]],
        exponents: &[u16],
    ) -> Result<()> {
        if unit_len == 0 {
            return Ok(());
        }
        if data.len() > unit_len {
            return Err(Par2Error::OversizedInput {
                actual: data.len(),
                unit: unit_len,
            });
        }
        if self.unit_len != unit_len {
            if !self.indices.is_empty() {
                return Err(Par2Error::StagingUnitChanged {
                    staged: self.indices.len(),
                    unit: unit_len,
                });
            }
            self.staging.clear();
            self.unit_len = unit_len;
        }
        if self.staging.is_empty() {
            debug!(
                "Allocating {} staging buffers of {} bytes",
                self.capacity, unit_len
            );
            self.staging = (0..self.capacity).map(|_| engine.alloc(unit_len)).collect();
        }

        let slot = &mut self.staging[self.indices.len()];
        slot[..data.len()].copy_from_slice(data);
        slot[data.len()..].fill(0);
        self.indices.push(slice.as_u32());
        trace!("Staged slice {} ({}/{})", slice, self.indices.len(), self.capacity);

        if self.indices.len() >= self.capacity {
            self.issue(engine, outputs, exponents)?;
        }
        Ok(())
    }

    /// Process whatever is staged, then finalise every output
    ///
    /// Finalisation runs even when nothing was ever staged. Afterwards the
    /// next batch overwrites the outputs again.
    pub fn flush<E: RecoveryEngine + ?Sized>(
        &mut self,
        engine: &E,
        outputs: &mut [&mut [u8]],
        exponents: &[u16],
    ) -> Result<()> {
        if !self.indices.is_empty() {
            self.issue(engine, outputs, exponents)?;
        }
        engine.finalise(outputs)?;
        self.merge = false;
        Ok(())
    }

    /// Drop staging buffers and counters; outputs are left untouched
    pub fn reset(&mut self) {
        self.staging.clear();
        self.indices.clear();
        self.unit_len = 0;
        self.merge = false;
    }

    fn issue<E: RecoveryEngine + ?Sized>(
        &mut self,
        engine: &E,
        outputs: &mut [&mut [u8]],
        exponents: &[u16],
    ) -> Result<()> {
        let count = self.indices.len();
        let inputs: Vec<&[u8]> = self.staging[..count].iter().map(|b| b.as_slice()).collect();
        debug!(
            "Issuing batch of {} inputs to {} outputs (merge={})",
            count,
            outputs.len(),
            self.merge
        );
        engine.generate(&inputs, &self.indices, outputs, exponents, self.merge)?;
        self.merge = true;
        self.indices.clear();
        Ok(())
    }
}
