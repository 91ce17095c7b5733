//! Azure publishes no hardware attributes, so specs are inferred from names.
//!
//! Three sources are tried in order and the first that yields a vCPU or
//! memory figure wins: the ARM SKU name (`Standard_D2s_v3`), the friendly
//! SKU name (`D2s v3`), then the meter name (`2 vCPU`, `8 GB`).

use once_cell::sync::Lazy;
use pricing_core::ResourceSpecs;
use regex::{Captures, Regex};
use std::collections::HashMap;

use super::{Attributes, ResourceSpecExtractor};

/// How memory follows from the vCPU count for a VM family
#[derive(Debug, Clone, Copy)]
enum MemoryRule {
    PerVcpu(f64),
    /// B-series ratios are irregular; look the SKU up in [`B_SERIES`]
    BurstableTable,
}

#[derive(Debug)]
struct FamilyRule {
    family: &'static str,
    pattern: Regex,
    memory: MemoryRule,
}

impl FamilyRule {
    fn new(family: &'static str, pattern: &str, memory: MemoryRule) -> Self {
        Self {
            family,
            pattern: Regex::new(pattern).expect("family pattern"),
            memory,
        }
    }
}

/// ARM SKU patterns, evaluated in order. Every pattern exposes `vcpu`, an
/// optional `active` (constrained vCPU count) and the lowercase `suffix`.
static ARM_SKU_RULES: Lazy<Vec<FamilyRule>> = Lazy::new(|| {
    vec![
        FamilyRule::new(
            "B",
            r"^Standard_B(?P<vcpu>\d+)(?P<suffix>[a-z]*)(?:_v\d+)?$",
            MemoryRule::BurstableTable,
        ),
        FamilyRule::new(
            "D",
            r"^Standard_D(?P<premium>S)?(?P<vcpu>\d+)(?:-(?P<active>\d+))?(?P<suffix>[a-z]*)(?:_v\d+)?$",
            MemoryRule::PerVcpu(4.0),
        ),
        FamilyRule::new(
            "F",
            r"^Standard_F(?P<premium>S)?(?P<vcpu>\d+)(?P<suffix>[a-z]*)(?:_v\d+)?$",
            MemoryRule::PerVcpu(2.0),
        ),
        FamilyRule::new(
            "E",
            r"^Standard_E(?P<premium>S)?(?P<vcpu>\d+)(?:-(?P<active>\d+))?(?P<suffix>[a-z]*)(?:_v\d+)?$",
            MemoryRule::PerVcpu(8.0),
        ),
        FamilyRule::new(
            "M",
            r"^Standard_M(?P<vcpu>\d+)(?:-(?P<active>\d+))?(?P<suffix>[a-z]*)(?:_v\d+)?$",
            MemoryRule::PerVcpu(28.0),
        ),
        FamilyRule::new(
            "G",
            r"^Standard_G(?P<premium>S)?(?P<vcpu>\d+)(?:-(?P<active>\d+))?(?P<suffix>[a-z]*)$",
            MemoryRule::PerVcpu(14.0),
        ),
        FamilyRule::new(
            "N",
            r"^Standard_N[CDVG](?P<vcpu>\d+)(?P<suffix>[a-z]*)(?:_[A-Z]\w*)?(?:_v\d+)?$",
            MemoryRule::PerVcpu(6.0),
        ),
    ]
});

/// Friendly SKU names: "D2s v3", "E8-4ds v5", "NC6s v3", "B2ms"
static FRIENDLY_SKU_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"^(?P<family>[A-Z]+?)(?P<premium>S)?(?P<vcpu>\d+)(?:-(?P<active>\d+))?(?P<suffix>[a-z]*)(?P<rest>(?:\s+[A-Z]\w*)?(?:\s+v\d+)?)$",
    )
    .expect("friendly sku pattern")
});

static METER_VCPU_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)(\d+)\s*(?:vCPU|Core)s?\b").expect("meter vcpu pattern"));

static METER_MEMORY_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)(\d+(?:\.\d+)?)\s*(?:GB|GiB)\b").expect("meter memory pattern"));

/// (vCPU, memory GB) for B-series sizes
static B_SERIES: Lazy<HashMap<&'static str, (u32, f64)>> = Lazy::new(|| {
    HashMap::from([
        ("B1ls", (1, 0.5)),
        ("B1s", (1, 1.0)),
        ("B1ms", (1, 2.0)),
        ("B2s", (2, 4.0)),
        ("B2ms", (2, 8.0)),
        ("B4ms", (4, 16.0)),
        ("B8ms", (8, 32.0)),
    ])
});

/// GPU counts for N-series sizes, keyed without the `Standard_` prefix
static N_SERIES_GPUS: Lazy<HashMap<&'static str, u32>> = Lazy::new(|| {
    HashMap::from([
        ("NC6", 1),
        ("NC12", 2),
        ("NC24", 4),
        ("NC24r", 4),
        ("NC6s_v2", 1),
        ("NC12s_v2", 2),
        ("NC24s_v2", 4),
        ("NC6s_v3", 1),
        ("NC12s_v3", 2),
        ("NC24s_v3", 4),
        ("NC24rs_v3", 4),
        ("NC4as_T4_v3", 1),
        ("NC8as_T4_v3", 1),
        ("NC16as_T4_v3", 1),
        ("NC64as_T4_v3", 4),
        ("NC24ads_A100_v4", 1),
        ("NC48ads_A100_v4", 2),
        ("NC96ads_A100_v4", 4),
        ("ND6s", 1),
        ("ND12s", 2),
        ("ND24s", 4),
        ("ND40rs_v2", 8),
        ("ND96asr_v4", 8),
        ("NV6", 1),
        ("NV12", 2),
        ("NV24", 4),
        ("NV12s_v3", 1),
        ("NV24s_v3", 2),
        ("NV48s_v3", 4),
    ])
});

type Tier = fn(&Attributes) -> Option<ResourceSpecs>;

const TIERS: [(&str, Tier); 3] = [
    ("armSkuName", from_arm_sku_name),
    ("skuName", from_friendly_sku_name),
    ("meterName", from_meter_name),
];

#[derive(Debug, Clone, Copy, Default)]
pub struct AzureSpecExtractor;

impl ResourceSpecExtractor for AzureSpecExtractor {
    fn extract(&self, _canonical_service_type: &str, attributes: &Attributes) -> ResourceSpecs {
        TIERS
            .iter()
            .filter(|(key, _)| attributes.get(*key).is_some_and(|v| !v.trim().is_empty()))
            .find_map(|(_, tier)| tier(attributes))
            .unwrap_or_default()
    }
}

fn from_arm_sku_name(attributes: &Attributes) -> Option<ResourceSpecs> {
    let sku = attributes.get("armSkuName")?.trim();
    ARM_SKU_RULES.iter().find_map(|rule| {
        let caps = rule.pattern.captures(sku)?;
        let key = sku.trim_start_matches("Standard_");
        family_specs(rule.family, rule.memory, key, &caps)
    })
}

fn from_friendly_sku_name(attributes: &Attributes) -> Option<ResourceSpecs> {
    let name = strip_offer_qualifiers(attributes.get("skuName")?.trim());
    let caps = FRIENDLY_SKU_RE.captures(name)?;
    let family = caps.name("family")?.as_str();
    let (family_key, memory) = friendly_family(family)?;
    let key = name.split_whitespace().collect::<Vec<_>>().join("_");
    family_specs(family_key, memory, &key, &caps)
}

fn from_meter_name(attributes: &Attributes) -> Option<ResourceSpecs> {
    let meter = attributes.get("meterName")?;
    let vcpu = METER_VCPU_RE
        .captures(meter)
        .and_then(|caps| caps[1].parse::<u32>().ok())
        .filter(|v| *v > 0);
    let memory_gb = METER_MEMORY_RE
        .captures(meter)
        .and_then(|caps| caps[1].parse::<f64>().ok())
        .filter(|v| *v > 0.0);
    if vcpu.is_none() && memory_gb.is_none() {
        return None;
    }
    Some(ResourceSpecs {
        vcpu,
        memory_gb,
        ..ResourceSpecs::default()
    })
}

/// "D2s v3 Spot" and "D2 v3 Low Priority" describe the same hardware as "D2s v3"
fn strip_offer_qualifiers(name: &str) -> &str {
    name.trim_end_matches(" Low Priority")
        .trim_end_matches(" Spot")
        .trim()
}

fn friendly_family(family: &str) -> Option<(&'static str, MemoryRule)> {
    let first = family.chars().next()?;
    ARM_SKU_RULES
        .iter()
        .find(|rule| rule.family.starts_with(first))
        .map(|rule| (rule.family, rule.memory))
}

fn family_specs(
    family: &'static str,
    memory: MemoryRule,
    sku_key: &str,
    caps: &Captures<'_>,
) -> Option<ResourceSpecs> {
    let sized_vcpu: u32 = caps.name("vcpu")?.as_str().parse().ok()?;
    let active_vcpu = caps
        .name("active")
        .and_then(|m| m.as_str().parse::<u32>().ok());
    let suffix = caps.name("suffix").map_or("", |m| m.as_str());

    let mut specs = ResourceSpecs {
        vcpu: Some(active_vcpu.unwrap_or(sized_vcpu)),
        ..ResourceSpecs::default()
    };

    match memory {
        MemoryRule::PerVcpu(ratio) => specs.memory_gb = Some(f64::from(sized_vcpu) * ratio),
        MemoryRule::BurstableTable => {
            specs.burstable = Some(true);
            if let Some((vcpu, memory_gb)) = B_SERIES.get(sku_key) {
                specs.vcpu = Some(*vcpu);
                specs.memory_gb = Some(*memory_gb);
            }
        }
    }

    if family == "N" {
        specs.gpu_count = N_SERIES_GPUS.get(sku_key).copied();
    }

    let premium = caps.name("premium").is_some() || suffix.contains('s');
    if premium {
        specs.storage_type = Some("Premium SSD".to_string());
    }
    if suffix.contains('a') {
        specs.processor_type = Some("AMD".to_string());
    }
    if suffix.contains('p') {
        specs.architecture = Some("arm64".to_string());
    }

    Some(specs)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn attrs(pairs: &[(&str, &str)]) -> Attributes {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    fn extract(pairs: &[(&str, &str)]) -> ResourceSpecs {
        AzureSpecExtractor.extract("Compute Instance", &attrs(pairs))
    }

    #[test]
    fn test_general_purpose_arm_sku() {
        let specs = extract(&[("armSkuName", "Standard_D2s_v3")]);
        assert_eq!(specs.vcpu, Some(2));
        assert_eq!(specs.memory_gb, Some(8.0));
        assert_eq!(specs.storage_type.as_deref(), Some("Premium SSD"));
        assert_eq!(specs.burstable, None);
    }

    #[test]
    fn test_burstable_uses_lookup_table() {
        let b2s = extract(&[("armSkuName", "Standard_B2s")]);
        assert_eq!(b2s.vcpu, Some(2));
        assert_eq!(b2s.memory_gb, Some(4.0));
        assert_eq!(b2s.burstable, Some(true));

        let b1ls = extract(&[("armSkuName", "Standard_B1ls")]);
        assert_eq!(b1ls.memory_gb, Some(0.5));

        // unknown B size keeps the vCPU count, memory stays unknown
        let b16 = extract(&[("armSkuName", "Standard_B16als_v2")]);
        assert_eq!(b16.vcpu, Some(16));
        assert_eq!(b16.memory_gb, None);
    }

    #[test]
    fn test_family_ratios() {
        assert_eq!(extract(&[("armSkuName", "Standard_F4s_v2")]).memory_gb, Some(8.0));
        assert_eq!(extract(&[("armSkuName", "Standard_E4s_v3")]).memory_gb, Some(32.0));
        assert_eq!(extract(&[("armSkuName", "Standard_M8ms")]).memory_gb, Some(224.0));
        assert_eq!(extract(&[("armSkuName", "Standard_GS2")]).memory_gb, Some(28.0));
    }

    #[test]
    fn test_constrained_vcpu_sizes() {
        let specs = extract(&[("armSkuName", "Standard_E8-4ds_v5")]);
        assert_eq!(specs.vcpu, Some(4));
        assert_eq!(specs.memory_gb, Some(64.0));
    }

    #[test]
    fn test_suffix_flags() {
        let amd = extract(&[("armSkuName", "Standard_D4as_v5")]);
        assert_eq!(amd.processor_type.as_deref(), Some("AMD"));

        let arm = extract(&[("armSkuName", "Standard_D2ps_v5")]);
        assert_eq!(arm.architecture.as_deref(), Some("arm64"));

        let standard_disk = extract(&[("armSkuName", "Standard_D2_v3")]);
        assert_eq!(standard_disk.storage_type, None);
    }

    #[test]
    fn test_gpu_series() {
        let nc6s = extract(&[("armSkuName", "Standard_NC6s_v3")]);
        assert_eq!(nc6s.vcpu, Some(6));
        assert_eq!(nc6s.memory_gb, Some(36.0));
        assert_eq!(nc6s.gpu_count, Some(1));

        let nd40 = extract(&[("armSkuName", "Standard_ND40rs_v2")]);
        assert_eq!(nd40.gpu_count, Some(8));

        let t4 = extract(&[("armSkuName", "Standard_NC4as_T4_v3")]);
        assert_eq!(t4.gpu_count, Some(1));
        assert_eq!(t4.processor_type.as_deref(), Some("AMD"));
    }

    #[test]
    fn test_friendly_name_when_arm_name_unusable() {
        let specs = extract(&[("armSkuName", "Custom_Thing"), ("skuName", "D4s v3 Spot")]);
        assert_eq!(specs.vcpu, Some(4));
        assert_eq!(specs.memory_gb, Some(16.0));

        let burstable = extract(&[("skuName", "B2ms")]);
        assert_eq!(burstable.memory_gb, Some(8.0));
    }

    #[test]
    fn test_friendly_premium_family_matches_arm_name() {
        for (arm, friendly) in [
            ("Standard_DS2_v2", "DS2 v2"),
            ("Standard_GS2", "GS2"),
            ("Standard_FS4", "FS4"),
        ] {
            let from_arm = extract(&[("armSkuName", arm)]);
            let from_friendly = extract(&[("skuName", friendly)]);
            assert_eq!(from_friendly.storage_type.as_deref(), Some("Premium SSD"), "{friendly}");
            assert_eq!(from_friendly.vcpu, from_arm.vcpu, "{friendly}");
            assert_eq!(from_friendly.memory_gb, from_arm.memory_gb, "{friendly}");
        }

        let standard = extract(&[("skuName", "D2 v2")]);
        assert_eq!(standard.storage_type, None);
        let gpu = extract(&[("skuName", "NC6")]);
        assert_eq!(gpu.vcpu, Some(6));
        assert_eq!(gpu.gpu_count, Some(1));
    }

    #[test]
    fn test_meter_name_fallback() {
        let specs = extract(&[
            ("skuName", "Standard"),
            ("meterName", "4 vCPU 16 GB"),
        ]);
        assert_eq!(specs.vcpu, Some(4));
        assert_eq!(specs.memory_gb, Some(16.0));

        let cores = extract(&[("meterName", "8 Cores")]);
        assert_eq!(cores.vcpu, Some(8));
    }

    #[test]
    fn test_nothing_recognizable() {
        let specs = extract(&[("skuName", "Hot LRS"), ("meterName", "Data Stored")]);
        assert!(specs.is_empty());
    }
}
