use clinisync_domain::{EntityKind, EntitySnapshot, Product, ProductCategory, Result};
use serde_json::{json, Value};

use super::{require, truncate, wrong_variant, EntityMapping, ResolvedDependencies};

const NAME_LIMIT: usize = 100;

pub(super) struct ProductMapping;

impl ProductMapping {
    fn product<'a>(snapshot: &'a EntitySnapshot) -> Result<&'a Product> {
        match snapshot {
            EntitySnapshot::Product(product) => Ok(product),
            other => Err(wrong_variant(EntityKind::Product, other)),
        }
    }
}

/// Inventory or income account group per category.
const fn account_group(category: ProductCategory) -> u32 {
    match category {
        ProductCategory::Medication => 1281,
        ProductCategory::Supply => 1282,
        ProductCategory::Service => 1283,
        ProductCategory::Equipment => 1284,
    }
}

impl EntityMapping for ProductMapping {
    fn kind(&self) -> EntityKind {
        EntityKind::Product
    }

    fn validate(&self, snapshot: &EntitySnapshot) -> Result<()> {
        let product = Self::product(snapshot)?;
        require(!product.code.trim().is_empty(), || format!("product {} has no code", product.id))?;
        require(!product.name.trim().is_empty(), || format!("product {} has no name", product.id))?;
        require(product.unit_price.minor() >= 0, || {
            format!("product {} has a negative price", product.id)
        })
    }

    fn to_payload(&self, snapshot: &EntitySnapshot, _: &ResolvedDependencies) -> Result<Value> {
        let product = Self::product(snapshot)?;
        let is_service = product.category == ProductCategory::Service;
        // Medications and health services are VAT-excluded.
        let excluded = matches!(product.category, ProductCategory::Medication | ProductCategory::Service);

        Ok(json!({
            "code": product.code.trim(),
            "name": truncate(product.name.trim(), NAME_LIMIT),
            "description": product.description,
            "account_group": account_group(product.category),
            "type": if is_service { "Service" } else { "Product" },
            "stock_control": product.track_stock && !is_service,
            "active": product.active,
            "tax_classification": if excluded { "Excluded" } else { "Taxed" },
            "taxes": if excluded { json!([]) } else { json!([{ "id": 1, "percentage": 19 }]) },
            "prices": [{
                "currency_code": "COP",
                "price_list": [{ "position": 1, "value": product.unit_price.to_decimal() }],
            }],
        }))
    }
}

#[cfg(test)]
mod tests {
    use clinisync_domain::{CliniSyncError, Money};

    use super::*;
    use crate::testing::fixtures;

    #[test]
    fn medication_is_excluded_with_inventory_group() {
        let mut product = fixtures::product("p-1", "MED-001");
        product.name = "x".repeat(150);
        product.unit_price = Money::from_minor(1_250_050);

        let payload = ProductMapping
            .to_payload(&EntitySnapshot::Product(product), &Default::default())
            .unwrap();

        assert_eq!(payload["account_group"], 1281);
        assert_eq!(payload["tax_classification"], "Excluded");
        assert_eq!(payload["taxes"], json!([]));
        assert_eq!(payload["name"].as_str().unwrap().len(), NAME_LIMIT);
        assert_eq!(payload["prices"][0]["price_list"][0]["value"], 12_500.5);
        assert_eq!(payload["stock_control"], true);
    }

    #[test]
    fn services_never_control_stock() {
        let mut product = fixtures::product("p-2", "SRV-CONSULTA");
        product.category = ProductCategory::Service;
        product.track_stock = true;

        let payload = ProductMapping
            .to_payload(&EntitySnapshot::Product(product), &Default::default())
            .unwrap();

        assert_eq!(payload["type"], "Service");
        assert_eq!(payload["stock_control"], false);
        assert_eq!(payload["account_group"], 1283);
    }

    #[test]
    fn supplies_are_taxed() {
        let mut product = fixtures::product("p-3", "INS-GASA");
        product.category = ProductCategory::Supply;

        let payload = ProductMapping
            .to_payload(&EntitySnapshot::Product(product), &Default::default())
            .unwrap();

        assert_eq!(payload["tax_classification"], "Taxed");
        assert_eq!(payload["taxes"][0]["percentage"], 19);
    }

    #[test]
    fn blank_code_is_invalid() {
        let product = fixtures::product("p-4", "");
        let err = ProductMapping.validate(&EntitySnapshot::Product(product)).unwrap_err();
        assert!(matches!(err, CliniSyncError::InvalidInput(_)));
    }
}
