//! CPU vendor/family/model detection and decision-tree dispatch.

use std::fs;

use crate::error::{CoreError, Result};

/// The fixed taxonomy of CPU types the decoder library knows about.
/// `Unknown` is the architectural-only fallback for
/// unrecognized Intel family/model combinations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CpuType {
    GenericP6,
    Core2,
    Dunnington,
    Tulsa,
    Nehalem,
    Xeon75xx,
    SandyBridge,
    SandyBridgeEp,
    IvyBridge,
    IvyBridgeEpEx,
    Haswell,
    Broadwell,
    KnightsLanding,
    SkylakeX,
    IcelakeX,
    IcelakeDe,
    TremontD,
    SapphireRapids,
    GraniteRapids,
    AmdK8,
    AmdScalableMca,
    ZhaoxinKh50000,
    Unknown,
}

#[derive(Debug, Clone)]
pub struct CpuInfo {
    pub vendor_id: String,
    pub family: u32,
    pub model: u32,
    pub mhz: f64,
    pub flags: String,
}

/// Parses `/proc/cpuinfo`'s first processor stanza for `vendor_id`,
/// `cpu family`, `model`, `cpu MHz`, and the first non-empty `flags` line.
pub fn read_cpuinfo(path: &str) -> Result<CpuInfo> {
    let text = fs::read_to_string(path)
        .map_err(|e| CoreError::DecodeError("cpuinfo", e.to_string()))?;

    let mut vendor_id = String::new();
    let mut family = 0u32;
    let mut model = 0u32;
    let mut mhz = 0.0f64;
    let mut flags = String::new();

    for line in text.lines() {
        let Some((key, value)) = line.split_once(':') else { continue };
        let key = key.trim();
        let value = value.trim();
        match key {
            "vendor_id" if vendor_id.is_empty() => vendor_id = value.to_string(),
            "cpu family" if family == 0 => family = value.parse().unwrap_or(0),
            "model" if model == 0 => model = value.parse().unwrap_or(0),
            "cpu MHz" if mhz == 0.0 => mhz = value.parse().unwrap_or(0.0),
            "flags" if flags.is_empty() => flags = value.to_string(),
            _ => {}
        }
        if !vendor_id.is_empty() && family != 0 && model != 0 && mhz != 0.0 && !flags.is_empty() {
            break;
        }
    }

    Ok(CpuInfo { vendor_id, family, model, mhz, flags })
}

/// Selects a [`CpuType`] from `(vendor, family, model)`. Unknown Intel
/// combinations fall back to [`CpuType::Unknown`] (architectural-only);
/// unknown AMD families fail with [`CoreError::UnsupportedCpu`].
pub fn classify(info: &CpuInfo) -> Result<CpuType> {
    match info.vendor_id.as_str() {
        "GenuineIntel" => Ok(classify_intel(info.family, info.model)),
        "AuthenticAMD" => classify_amd(info.family, info.model, &info.vendor_id),
        "CentaurHauls" | "Shanghai" => classify_zhaoxin(info.family, info.model, &info.vendor_id),
        _ => Ok(CpuType::Unknown),
    }
}

fn classify_intel(family: u32, model: u32) -> CpuType {
    if family != 6 && family != 15 {
        return CpuType::Unknown;
    }
    match model {
        0x0F | 0x17 => CpuType::Core2,
        0x1A => CpuType::Xeon75xx,
        0x1D => CpuType::Dunnington,
        0x1E | 0x1F | 0x25 | 0x2C | 0x2E => CpuType::Nehalem,
        0x2F => CpuType::Tulsa,
        0x2A => CpuType::SandyBridge,
        0x2D => CpuType::SandyBridgeEp,
        0x3A => CpuType::IvyBridge,
        0x3E => CpuType::IvyBridgeEpEx,
        0x3C | 0x45 | 0x46 => CpuType::Haswell,
        0x3D | 0x56 => CpuType::Broadwell,
        0x4F => CpuType::Broadwell,
        0x57 | 0x85 => CpuType::KnightsLanding,
        0x55 => CpuType::SkylakeX,
        0x6A | 0x6C => CpuType::IcelakeX,
        0x9D => CpuType::IcelakeDe,
        0x86 => CpuType::TremontD,
        0x8F => CpuType::SapphireRapids,
        0xAD | 0xAE => CpuType::GraniteRapids,
        _ => CpuType::Unknown,
    }
}

fn classify_amd(family: u32, _model: u32, vendor: &str) -> Result<CpuType> {
    match family {
        0x0F => Ok(CpuType::AmdK8),
        0x17 | 0x18 | 0x19 | 0x1A => Ok(CpuType::AmdScalableMca),
        _ => Err(CoreError::UnsupportedCpu { vendor: vendor.to_string(), family, model: _model }),
    }
}

fn classify_zhaoxin(family: u32, model: u32, vendor: &str) -> Result<CpuType> {
    if family == 7 && model >= 0x3B {
        Ok(CpuType::ZhaoxinKh50000)
    } else {
        Err(CoreError::UnsupportedCpu { vendor: vendor.to_string(), family, model })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn skylake_x_classifies_correctly() {
        assert_eq!(classify_intel(6, 0x55), CpuType::SkylakeX);
    }

    #[test]
    fn unknown_intel_model_is_architectural_only() {
        assert_eq!(classify_intel(6, 0x01), CpuType::Unknown);
    }

    #[test]
    fn amd_k8_family_matches() {
        assert!(matches!(classify_amd(0x0F, 0, "AuthenticAMD"), Ok(CpuType::AmdK8)));
    }

    #[test]
    fn unknown_amd_family_is_unsupported() {
        assert!(classify_amd(0x06, 0, "AuthenticAMD").is_err());
    }
}
