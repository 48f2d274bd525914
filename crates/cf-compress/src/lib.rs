use cf_core::{CfError, CfResult, ErrorKind};
use std::io::{Read, Write};

/// Compression presets mapped to zstd levels (spec §4.12).
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Preset {
    Fast,
    Balanced,
    Max,
}

impl Preset {
    pub fn level(self) -> i32 {
        match self {
            Preset::Fast => 1,
            Preset::Balanced => 9,
            Preset::Max => 19,
        }
    }
}

/// Stream-compress `reader` into `writer` at the given preset, never holding
/// the whole artefact in memory.
pub fn compress_to_writer<R: Read, W: Write>(reader: &mut R, writer: W, preset: Preset) -> CfResult<()> {
    let mut encoder = zstd::stream::Encoder::new(writer, preset.level())
        .map_err(|e| CfError::with_source(ErrorKind::StorageTransient, "failed to start zstd encoder", e))?;
    std::io::copy(reader, &mut encoder)
        .map_err(|e| CfError::with_source(ErrorKind::StorageTransient, "zstd compression failed", e))?;
    encoder
        .finish()
        .map_err(|e| CfError::with_source(ErrorKind::StorageTransient, "failed to finish zstd stream", e))?;
    Ok(())
}

/// Stream-decompress `reader` into `writer`.
pub fn decompress_to_writer<R: Read, W: Write>(reader: R, mut writer: W) -> CfResult<()> {
    let mut decoder = zstd::stream::Decoder::new(reader)
        .map_err(|e| CfError::with_source(ErrorKind::MalformedBeyondRepair, "failed to start zstd decoder", e))?;
    std::io::copy(&mut decoder, &mut writer)
        .map_err(|e| CfError::with_source(ErrorKind::MalformedBeyondRepair, "zstd decompression failed", e))?;
    Ok(())
}

/// Convenience in-memory wrapper for small artefacts (job manifests, reports).
pub fn compress_bytes(bytes: &[u8], preset: Preset) -> CfResult<Vec<u8>> {
    let mut input = bytes;
    let mut out = Vec::new();
    compress_to_writer(&mut input, &mut out, preset)?;
    Ok(out)
}

pub fn decompress_bytes(bytes: &[u8]) -> CfResult<Vec<u8>> {
    let mut out = Vec::new();
    decompress_to_writer(bytes, &mut out)?;
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_for_every_preset() {
        let data = b"the quick brown fox jumps over the lazy dog".repeat(100);
        for preset in [Preset::Fast, Preset::Balanced, Preset::Max] {
            let compressed = compress_bytes(&data, preset).unwrap();
            let decompressed = decompress_bytes(&compressed).unwrap();
            assert_eq!(decompressed, data, "preset {preset:?} did not round-trip");
        }
    }

    #[test]
    fn max_preset_compresses_smaller_than_fast_for_repetitive_input() {
        let data = b"aaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa".repeat(1000);
        let fast = compress_bytes(&data, Preset::Fast).unwrap();
        let max = compress_bytes(&data, Preset::Max).unwrap();
        assert!(max.len() <= fast.len());
    }

    #[test]
    fn decompressing_garbage_is_a_malformed_error() {
        let err = decompress_bytes(b"not zstd data").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::MalformedBeyondRepair);
    }

    #[test]
    fn preset_levels_match_spec_defaults() {
        assert_eq!(Preset::Fast.level(), 1);
        assert_eq!(Preset::Balanced.level(), 9);
        assert_eq!(Preset::Max.level(), 19);
    }
}
