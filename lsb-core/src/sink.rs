//! Write-back seam towards archive tooling.

use std::collections::{BTreeMap, HashMap};
use std::io;

use log::debug;

use crate::chart::Chart;
use crate::error::{Error, Result};

/// Receives re-encoded charts, keyed by their original entry name.
pub trait ChartSink {
    fn write_back(&mut self, entry_name: &str, bytes: &[u8]) -> io::Result<()>;
}

impl ChartSink for HashMap<String, Vec<u8>> {
    fn write_back(&mut self, entry_name: &str, bytes: &[u8]) -> io::Result<()> {
        self.insert(entry_name.to_string(), bytes.to_vec());
        Ok(())
    }
}

impl ChartSink for BTreeMap<String, Vec<u8>> {
    fn write_back(&mut self, entry_name: &str, bytes: &[u8]) -> io::Result<()> {
        self.insert(entry_name.to_string(), bytes.to_vec());
        Ok(())
    }
}

/// Encode `chart` and hand it to `sink`. Returns the encoded size.
pub fn patch_chart<S: ChartSink + ?Sized>(sink: &mut S, entry_name: &str, chart: &Chart) -> Result<usize> {
    let bytes = chart.to_bytes()?;
    sink.write_back(entry_name, &bytes).map_err(|source| Error::WriteBack {
        entry: entry_name.to_string(),
        source,
    })?;
    debug!("patched {entry_name} ({} bytes)", bytes.len());
    Ok(bytes.len())
}
