use once_cell::sync::Lazy;
use pricing_core::ResourceSpecs;
use regex::Regex;

use super::{parse_count, parse_gigabytes, Attributes, ResourceSpecExtractor};

/// "2 x 900 NVMe SSD", "24 x 2000 HDD"
static STORAGE_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)^\s*(\d+)\s*x\s*([\d,.]+)\s*(?:GB\s*)?(NVMe\s*)?(SSD|HDD)")
        .expect("storage pattern")
});

static CLOCK_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)(\d+(?:\.\d+)?)\s*GHz").expect("clock pattern"));

/// Graviton families carry a `g` after the generation digit: m6g, c7gn, t4g, x2gd
static ARM_FAMILY_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[a-z]+\d+g[a-z]*$").expect("arm family pattern"));

const BURSTABLE_FAMILIES: [&str; 3] = ["t2", "t3", "t4g"];

/// Reads specs from the explicit attributes AWS publishes on each product
#[derive(Debug, Clone, Copy, Default)]
pub struct AwsSpecExtractor;

impl ResourceSpecExtractor for AwsSpecExtractor {
    fn extract(&self, _canonical_service_type: &str, attributes: &Attributes) -> ResourceSpecs {
        let attr = |key: &str| {
            attributes
                .get(key)
                .map(|v| v.trim())
                .filter(|v| !v.is_empty() && !v.eq_ignore_ascii_case("na"))
        };

        let mut specs = ResourceSpecs {
            vcpu: attr("vcpu").and_then(parse_count),
            memory_gb: attr("memory").and_then(parse_gigabytes),
            gpu_count: attr("gpu").and_then(parse_count),
            gpu_memory_gb: attr("gpuMemory").and_then(parse_gigabytes),
            network_performance: attr("networkPerformance").map(str::to_string),
            processor_type: attr("physicalProcessor").map(str::to_string),
            clock_speed_ghz: attr("clockSpeed").and_then(parse_clock_speed),
            ..ResourceSpecs::default()
        };

        if let Some(storage) = attr("storage") {
            apply_storage(&mut specs, storage);
        }

        if let Some(instance_type) = attr("instanceType") {
            let family = instance_type.split('.').next().unwrap_or_default();
            if BURSTABLE_FAMILIES.iter().any(|prefix| family.starts_with(prefix)) {
                specs.burstable = Some(true);
            }
            specs.architecture = Some(if ARM_FAMILY_RE.is_match(family) {
                "arm64".to_string()
            } else {
                "x86_64".to_string()
            });
        } else if let Some(arch) = attr("processorArchitecture") {
            specs.architecture = Some(normalize_architecture(arch));
        }

        specs
    }
}

fn apply_storage(specs: &mut ResourceSpecs, storage: &str) {
    if let Some(caps) = STORAGE_RE.captures(storage) {
        let disks = caps[1].parse::<f64>().ok();
        let size = caps[2].replace(',', "").parse::<f64>().ok();
        if let (Some(disks), Some(size)) = (disks, size) {
            specs.storage_gb = Some(disks * size);
        }
        let medium = caps[4].to_uppercase();
        specs.storage_type = Some(if caps.get(3).is_some() {
            format!("NVMe {}", medium)
        } else {
            medium
        });
    } else if storage.to_lowercase().starts_with("ebs") {
        specs.storage_type = Some("EBS".to_string());
    }
}

fn parse_clock_speed(raw: &str) -> Option<f64> {
    CLOCK_RE
        .captures(raw)
        .and_then(|caps| caps[1].parse::<f64>().ok())
}

fn normalize_architecture(raw: &str) -> String {
    let lower = raw.to_lowercase();
    if lower.contains("arm") {
        "arm64".to_string()
    } else if lower.contains("64") || lower.contains("x86") {
        "x86_64".to_string()
    } else {
        raw.to_string()
    }
}
