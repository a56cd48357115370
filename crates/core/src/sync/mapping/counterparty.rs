use clinisync_domain::constants::{
    GENERIC_COUNTERPARTY_IDENTIFICATION, GENERIC_COUNTERPARTY_NAME,
};
use clinisync_domain::{Counterparty, EntityKind, EntitySnapshot, PersonType, Result};
use serde_json::{json, Value};

use super::catalogs::{city_codes, id_type_code};
use super::{require, wrong_variant, EntityMapping, ResolvedDependencies};

/// Customers and suppliers share one remote collection and differ only in
/// the third-party type.
pub(super) struct CounterpartyMapping {
    kind: EntityKind,
    party_type: &'static str,
}

pub(super) static CUSTOMER: CounterpartyMapping =
    CounterpartyMapping { kind: EntityKind::Customer, party_type: "Customer" };

pub(super) static SUPPLIER: CounterpartyMapping =
    CounterpartyMapping { kind: EntityKind::Supplier, party_type: "Supplier" };

impl CounterpartyMapping {
    fn party<'a>(&self, snapshot: &'a EntitySnapshot) -> Result<&'a Counterparty> {
        match (self.kind, snapshot) {
            (EntityKind::Customer, EntitySnapshot::Customer(party))
            | (EntityKind::Supplier, EntitySnapshot::Supplier(party)) => Ok(party),
            _ => Err(wrong_variant(self.kind, snapshot)),
        }
    }
}

impl EntityMapping for CounterpartyMapping {
    fn kind(&self) -> EntityKind {
        self.kind
    }

    fn validate(&self, snapshot: &EntitySnapshot) -> Result<()> {
        let party = self.party(snapshot)?;
        require(!party.identification.trim().is_empty(), || {
            format!("{} {} has no identification", self.kind, party.id)
        })?;
        require(!party.display_name().is_empty(), || {
            format!("{} {} has no name", self.kind, party.id)
        })
    }

    fn to_payload(&self, snapshot: &EntitySnapshot, _: &ResolvedDependencies) -> Result<Value> {
        let party = self.party(snapshot)?;
        let (person_type, name) = match party.person_type {
            PersonType::Company => ("Company", json!([party.display_name()])),
            PersonType::Person => ("Person", json!([party.first_name, party.last_name])),
        };
        let (state_code, city_code) = city_codes(party.city.as_deref(), party.department.as_deref());
        let phone = party
            .phone
            .as_deref()
            .map(digits)
            .filter(|number| !number.is_empty())
            .map(|number| json!({ "indicative": "57", "number": number }));
        let phones: Vec<Value> = phone.iter().cloned().collect();

        let mut payload = json!({
            "type": self.party_type,
            "person_type": person_type,
            "id_type": id_type_code(&party.id_type),
            "identification": party.identification.trim(),
            "branch_office": 0,
            "name": name,
            "active": party.active,
            "fiscal_responsibilities": [{ "code": "R-99-PN" }],
            "address": {
                "address": party.address.as_deref().unwrap_or("Sin dirección"),
                "city": {
                    "country_code": "Co",
                    "state_code": state_code,
                    "city_code": city_code,
                },
            },
            "phones": phones,
            "contacts": [{
                "first_name": party.first_name,
                "last_name": party.last_name,
                "email": party.email,
                "phone": phone,
            }],
        });
        if let Some(check_digit) = &party.check_digit {
            payload["check_digit"] = json!(check_digit);
        }
        Ok(payload)
    }
}

/// Payload that creates the shared final-consumer customer.
pub fn generic_counterparty_payload() -> Value {
    json!({
        "type": "Customer",
        "person_type": "Person",
        "id_type": "13",
        "identification": GENERIC_COUNTERPARTY_IDENTIFICATION,
        "branch_office": 0,
        "name": [GENERIC_COUNTERPARTY_NAME, ""],
        "active": true,
        "fiscal_responsibilities": [{ "code": "R-99-PN" }],
        "address": {
            "address": "Sin dirección",
            "city": { "country_code": "Co", "state_code": "11", "city_code": "11001" },
        },
        "phones": [],
        "contacts": [],
    })
}

fn digits(text: &str) -> String {
    text.chars().filter(char::is_ascii_digit).collect()
}

#[cfg(test)]
mod tests {
    use clinisync_domain::CliniSyncError;

    use super::*;
    use crate::testing::fixtures;

    #[test]
    fn person_payload_carries_codes() {
        let mut party = fixtures::counterparty("cust-1", "1020304050");
        party.id_type = "CE".into();
        party.city = Some("Cali".into());
        party.phone = Some("(301) 555-1234".into());

        let payload =
            CUSTOMER.to_payload(&EntitySnapshot::Customer(party), &Default::default()).unwrap();

        assert_eq!(payload["type"], "Customer");
        assert_eq!(payload["id_type"], "22");
        assert_eq!(payload["name"], json!(["Ana", "Gómez"]));
        assert_eq!(payload["address"]["city"]["city_code"], "76001");
        assert_eq!(payload["address"]["city"]["state_code"], "76");
        assert_eq!(payload["phones"][0]["number"], "3015551234");
    }

    #[test]
    fn company_supplier_uses_single_name() {
        let mut party = fixtures::counterparty("sup-1", "900123456");
        party.person_type = PersonType::Company;
        party.id_type = "NIT".into();
        party.company_name = Some("Droguería Central SAS".into());
        party.check_digit = Some("7".into());

        let payload =
            SUPPLIER.to_payload(&EntitySnapshot::Supplier(party), &Default::default()).unwrap();

        assert_eq!(payload["type"], "Supplier");
        assert_eq!(payload["person_type"], "Company");
        assert_eq!(payload["name"], json!(["Droguería Central SAS"]));
        assert_eq!(payload["check_digit"], "7");
    }

    #[test]
    fn missing_identification_is_rejected() {
        let party = fixtures::counterparty("cust-1", "  ");
        let err = CUSTOMER.validate(&EntitySnapshot::Customer(party)).unwrap_err();
        assert!(matches!(err, CliniSyncError::InvalidInput(_)));
    }

    #[test]
    fn supplier_mapping_refuses_customer_snapshot() {
        let party = fixtures::counterparty("cust-1", "1020");
        let err = SUPPLIER.validate(&EntitySnapshot::Customer(party)).unwrap_err();
        assert!(matches!(err, CliniSyncError::Internal(_)));
    }
}
