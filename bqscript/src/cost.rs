//! Processed bytes and what they cost.
//!
//! BigQuery bills on-demand queries by the number of bytes they scan. We carry
//! that number around as an exact byte count, and only convert to MiB (for
//! display) or TiB (for billing) at the edges.

use std::{fmt, iter, ops::Add, str::FromStr};

use crate::common::*;

const BYTES_PER_MIB: f64 = (1u64 << 20) as f64;
const BYTES_PER_TIB: f64 = (1u64 << 40) as f64;

/// The number of bytes a query job processed (or would process).
#[derive(Clone, Copy, Debug, Default, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct ProcessedBytes(u64);

impl ProcessedBytes {
    /// Wrap a raw byte count.
    pub fn new(bytes: u64) -> Self {
        ProcessedBytes(bytes)
    }

    /// Nothing processed.
    pub fn zero() -> Self {
        ProcessedBytes(0)
    }

    /// The raw byte count.
    pub fn bytes(self) -> u64 {
        self.0
    }

    /// Size in mebibytes (2^20 bytes).
    pub fn mebibytes(self) -> f64 {
        self.0 as f64 / BYTES_PER_MIB
    }

    /// Size in tebibytes (2^40 bytes), the unit BigQuery bills in.
    pub fn tebibytes(self) -> f64 {
        self.0 as f64 / BYTES_PER_TIB
    }

    /// What would scanning this many bytes cost at `rate`?
    pub fn estimated_cost(self, rate: UsdPerTb) -> CostEstimate {
        CostEstimate {
            bytes: self,
            usd: self.tebibytes() * rate.0,
        }
    }
}

impl Add for ProcessedBytes {
    type Output = ProcessedBytes;

    fn add(self, rhs: Self) -> Self::Output {
        ProcessedBytes(self.0.saturating_add(rhs.0))
    }
}

impl iter::Sum for ProcessedBytes {
    fn sum<I>(iter: I) -> Self
    where
        I: Iterator<Item = Self>,
    {
        iter.fold(ProcessedBytes::zero(), |total, bytes| total + bytes)
    }
}

impl fmt::Display for ProcessedBytes {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.2} MiB", self.mebibytes())
    }
}

impl FromStr for ProcessedBytes {
    type Err = Error;

    /// Parse the decimal string BigQuery uses for `int64` statistics.
    fn from_str(s: &str) -> Result<Self> {
        let bytes = s
            .parse::<u64>()
            .with_context(|| format!("could not parse byte count {:?}", s))?;
        Ok(ProcessedBytes(bytes))
    }
}

/// On-demand query pricing, in US dollars per TiB scanned.
#[derive(Clone, Copy, Debug, PartialEq, PartialOrd)]
pub struct UsdPerTb(f64);

impl UsdPerTb {
    /// Create a new rate. Rates must be finite and non-negative.
    pub fn new(usd: f64) -> Result<Self> {
        if usd.is_finite() && usd >= 0.0 {
            Ok(UsdPerTb(usd))
        } else {
            Err(format_err!("invalid price per TiB: {}", usd))
        }
    }

    /// The rate in dollars.
    pub fn usd(self) -> f64 {
        self.0
    }
}

impl Default for UsdPerTb {
    fn default() -> Self {
        UsdPerTb(5.0)
    }
}

impl fmt::Display for UsdPerTb {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "${}/TiB", self.0)
    }
}

impl FromStr for UsdPerTb {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let usd = s
            .trim_start_matches('$')
            .parse::<f64>()
            .with_context(|| format!("could not parse price per TiB {:?}", s))?;
        UsdPerTb::new(usd)
    }
}

/// The estimated price of processing some number of bytes.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct CostEstimate {
    bytes: ProcessedBytes,
    usd: f64,
}

impl CostEstimate {
    /// The bytes this estimate is based on.
    pub fn bytes(&self) -> ProcessedBytes {
        self.bytes
    }

    /// The estimated cost in dollars.
    pub fn usd(&self) -> f64 {
        self.usd
    }
}

impl fmt::Display for CostEstimate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "${:.4}", self.usd)
    }
}
