#![allow(dead_code)]

use pricing_core::{NormalizedRegion, Provider, RawPricingRecord, ServiceMapping};
use serde_json::{json, Value};

pub fn service_mappings() -> Vec<ServiceMapping> {
    [
        (Provider::Aws, "AmazonEC2", "Compute Instance", "Compute", "Virtual Machines"),
        (Provider::Aws, "AWSLambda", "Serverless Function", "Compute", "Serverless"),
        (Provider::Azure, "Virtual Machines", "Compute Instance", "Compute", "Virtual Machines"),
        (Provider::Azure, "Storage", "Object Storage", "Storage", "Blob Storage"),
    ]
    .into_iter()
    .map(|(provider, name, service_type, category, family)| ServiceMapping {
        provider,
        vendor_service_name: name.to_string(),
        vendor_service_code: Some(name.to_string()),
        canonical_service_type: service_type.to_string(),
        service_category: category.to_string(),
        service_family: family.to_string(),
    })
    .collect()
}

pub fn regions() -> Vec<NormalizedRegion> {
    vec![
        NormalizedRegion {
            canonical_code: "us-east".to_string(),
            aws_region: Some("us-east-1".to_string()),
            azure_region: Some("eastus".to_string()),
            display_name: "US East".to_string(),
            country: Some("US".to_string()),
            continent: Some("North America".to_string()),
        },
        NormalizedRegion {
            canonical_code: "eu-west".to_string(),
            aws_region: Some("eu-west-1".to_string()),
            azure_region: Some("westeurope".to_string()),
            display_name: "EU West".to_string(),
            country: Some("IE".to_string()),
            continent: Some("Europe".to_string()),
        },
    ]
}

pub fn aws_on_demand(sku: &str, instance_type: &str, vcpu: u32, price: &str) -> Value {
    json!({
        "product": {
            "sku": sku,
            "productFamily": "Compute Instance",
            "attributes": {
                "servicecode": "AmazonEC2",
                "instanceType": instance_type,
                "vcpu": vcpu.to_string(),
                "memory": format!("{} GiB", vcpu * 4),
                "storage": "EBS only"
            }
        },
        "terms": {
            "OnDemand": {
                format!("{sku}.JRTCKXETXF"): {
                    "effectiveDate": "2024-03-01T00:00:00Z",
                    "priceDimensions": {
                        format!("{sku}.JRTCKXETXF.6YS6EN2CT7"): {
                            "description": format!("On Demand Linux {instance_type} Instance Hour"),
                            "unit": "Hrs",
                            "beginRange": "0",
                            "endRange": "Inf",
                            "pricePerUnit": { "USD": price }
                        }
                    },
                    "termAttributes": {}
                }
            }
        }
    })
}

pub fn azure_vm(arm_sku: &str, sku_name: &str, price: f64) -> Value {
    json!({
        "currencyCode": "USD",
        "tierMinimumUnits": 0.0,
        "retailPrice": price,
        "unitPrice": price,
        "armRegionName": "eastus",
        "location": "US East",
        "effectiveStartDate": "2023-05-01T00:00:00Z",
        "meterId": format!("meter-{sku_name}"),
        "meterName": sku_name,
        "skuId": format!("DZH318Z0BQ4L/{sku_name}"),
        "productName": "Virtual Machines Series",
        "skuName": sku_name,
        "serviceName": "Virtual Machines",
        "serviceFamily": "Compute",
        "unitOfMeasure": "1 Hour",
        "type": "Consumption",
        "armSkuName": arm_sku
    })
}

pub fn raw(id: i64, provider: Provider, service_code: &str, region: &str, payload: Value) -> RawPricingRecord {
    RawPricingRecord {
        id,
        provider: provider.as_str().to_string(),
        service_code: service_code.to_string(),
        region: region.to_string(),
        service_family: None,
        payload: payload.to_string(),
        collection_id: "collection-test".to_string(),
    }
}

/// Ten mapped AWS records, ten mapped Azure records, and unmapped or free ones
pub fn mixed_records() -> Vec<RawPricingRecord> {
    let mut records = Vec::new();
    for i in 1..=10 {
        records.push(raw(
            i,
            Provider::Aws,
            "AmazonEC2",
            "us-east-1",
            aws_on_demand(&format!("AWS{i}"), "m5.large", 2, "0.096"),
        ));
    }
    for i in 11..=20 {
        records.push(raw(
            i,
            Provider::Azure,
            "Virtual Machines",
            "eastus",
            azure_vm("Standard_D2s_v3", &format!("D2s v3 {i}"), 0.096),
        ));
    }
    // unmapped service
    records.push(raw(
        21,
        Provider::Aws,
        "AmazonNeptune",
        "us-east-1",
        aws_on_demand("NEP1", "db.r5.large", 2, "0.348"),
    ));
    // free line
    records.push(raw(
        22,
        Provider::Aws,
        "AmazonEC2",
        "us-east-1",
        aws_on_demand("FREE1", "t2.micro", 1, "0.0000000000"),
    ));
    // broken payload shape
    records.push(raw(23, Provider::Azure, "Virtual Machines", "eastus", json!({ "retailPrice": 1.0 })));
    records
}
