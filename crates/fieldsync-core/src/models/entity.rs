//! Syncable entity kinds and their declarative descriptors

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Every record type subject to pull/push reconciliation.
///
/// The serialized form is the wire key used in pull snapshots and in the
/// `entityType` field of pushed changes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum EntityKind {
    #[serde(rename = "livestock")]
    Livestock,
    #[serde(rename = "feedings")]
    Feeding,
    #[serde(rename = "weightChanges")]
    WeightChange,
    #[serde(rename = "dewormings")]
    Deworming,
    #[serde(rename = "medications")]
    Medication,
    #[serde(rename = "vaccinations")]
    Vaccination,
    #[serde(rename = "disposals")]
    Disposal,
    #[serde(rename = "birthEvents")]
    BirthEvent,
    #[serde(rename = "abortedPregnancies")]
    AbortedPregnancy,
    #[serde(rename = "milkings")]
    Milking,
    #[serde(rename = "pregnancies")]
    Pregnancy,
    #[serde(rename = "inseminations")]
    Insemination,
    #[serde(rename = "dryoffs")]
    Dryoff,
    #[serde(rename = "transfers")]
    Transfer,
}

/// How a fetcher decides whether a stored row is visible to a scope.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScopePredicate {
    /// `farm_uuid IN farms AND livestock_uuid IN livestock`
    FarmAndLivestock,
    /// `farm_uuid IN farms`
    FarmOnly,
    /// `farm_uuid IN farms OR to_farm_uuid IN farms`, ignoring livestock.
    ///
    /// A transferred animal is no longer attributable to its origin farm by
    /// livestock id alone, so both farms keep visibility of the transfer.
    SourceOrDestinationFarm,
}

/// Declarative description of one syncable table.
#[derive(Debug)]
pub struct EntityDescriptor {
    pub kind: EntityKind,
    /// Wire key (`feedings`, `transfers`, ...)
    pub key: &'static str,
    /// Backing `SQLite` table
    pub table: &'static str,
    pub predicate: ScopePredicate,
    /// Wire-safe payload fields, in projection order
    pub fields: &'static [&'static str],
}

/// Ownership columns extracted from a change payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Ownership {
    pub farm_uuid: Uuid,
    pub livestock_uuid: Option<Uuid>,
    pub to_farm_uuid: Option<Uuid>,
}

pub const FARM_UUID: &str = "farmUuid";
pub const LIVESTOCK_UUID: &str = "livestockUuid";
pub const TO_FARM_UUID: &str = "toFarmUuid";
pub const CREATED_AT: &str = "createdAt";

const LIVESTOCK: EntityDescriptor = EntityDescriptor {
    kind: EntityKind::Livestock,
    key: "livestock",
    table: "livestock",
    predicate: ScopePredicate::FarmOnly,
    fields: &[
        "identificationNumber",
        "dummyTagId",
        "barcodeTagId",
        "rfidTagId",
        "livestockTypeId",
        "name",
        "dateOfBirth",
        "motherUuid",
        "fatherUuid",
        "gender",
        "breedId",
        "speciesId",
        "status",
        "livestockObtainedMethodId",
        "dateFirstEnteredToFarm",
        "weightAsOnRegistration",
    ],
};

const FEEDING: EntityDescriptor = EntityDescriptor {
    kind: EntityKind::Feeding,
    key: "feedings",
    table: "feedings",
    predicate: ScopePredicate::FarmAndLivestock,
    fields: &[
        "feedingTypeId",
        "feedingUnitId",
        "foodSupplier",
        "foodCost",
        "amount",
        "feedingDate",
        "remarks",
    ],
};

const WEIGHT_CHANGE: EntityDescriptor = EntityDescriptor {
    kind: EntityKind::WeightChange,
    key: "weightChanges",
    table: "weight_changes",
    predicate: ScopePredicate::FarmAndLivestock,
    fields: &[
        "oldWeight",
        "newWeight",
        "weightUnitId",
        "weighedOn",
        "remarks",
    ],
};

const DEWORMING: EntityDescriptor = EntityDescriptor {
    kind: EntityKind::Deworming,
    key: "dewormings",
    table: "dewormings",
    predicate: ScopePredicate::FarmAndLivestock,
    fields: &[
        "administrationRouteId",
        "medicineId",
        "doctorId",
        "vetName",
        "dosage",
        "dewormingDate",
        "nextAdministrationDate",
        "remarks",
    ],
};

const MEDICATION: EntityDescriptor = EntityDescriptor {
    kind: EntityKind::Medication,
    key: "medications",
    table: "medications",
    predicate: ScopePredicate::FarmAndLivestock,
    fields: &[
        "diseaseId",
        "medicineId",
        "quantity",
        "dosage",
        "medicationDate",
        "treatmentOutcome",
        "remarks",
    ],
};

const VACCINATION: EntityDescriptor = EntityDescriptor {
    kind: EntityKind::Vaccination,
    key: "vaccinations",
    table: "vaccinations",
    predicate: ScopePredicate::FarmAndLivestock,
    fields: &[
        "vaccinationNumber",
        "vaccineId",
        "vetId",
        "diseaseIds",
        "vaccinationDate",
        "remarks",
    ],
};

const DISPOSAL: EntityDescriptor = EntityDescriptor {
    kind: EntityKind::Disposal,
    key: "disposals",
    table: "disposals",
    predicate: ScopePredicate::FarmAndLivestock,
    fields: &["disposalTypeId", "reasons", "disposalDate", "remarks"],
};

const BIRTH_EVENT: EntityDescriptor = EntityDescriptor {
    kind: EntityKind::BirthEvent,
    key: "birthEvents",
    table: "birth_events",
    predicate: ScopePredicate::FarmAndLivestock,
    fields: &[
        "birthTypeId",
        "birthProblemId",
        "calvingMethodId",
        "calfUuid",
        "eventDate",
        "remarks",
    ],
};

const ABORTED_PREGNANCY: EntityDescriptor = EntityDescriptor {
    kind: EntityKind::AbortedPregnancy,
    key: "abortedPregnancies",
    table: "aborted_pregnancies",
    predicate: ScopePredicate::FarmAndLivestock,
    fields: &["abortionDate", "remarks"],
};

const MILKING: EntityDescriptor = EntityDescriptor {
    kind: EntityKind::Milking,
    key: "milkings",
    table: "milkings",
    predicate: ScopePredicate::FarmAndLivestock,
    fields: &[
        "milkingMethodId",
        "session",
        "amount",
        "milkingDate",
        "remarks",
    ],
};

const PREGNANCY: EntityDescriptor = EntityDescriptor {
    kind: EntityKind::Pregnancy,
    key: "pregnancies",
    table: "pregnancies",
    predicate: ScopePredicate::FarmAndLivestock,
    fields: &["testResultId", "noOfMonths", "testDate", "remarks"],
};

const INSEMINATION: EntityDescriptor = EntityDescriptor {
    kind: EntityKind::Insemination,
    key: "inseminations",
    table: "inseminations",
    predicate: ScopePredicate::FarmAndLivestock,
    fields: &[
        "lastHeatDate",
        "currentHeatDate",
        "inseminationServiceId",
        "semenStrawTypeId",
        "inseminationDate",
        "remarks",
    ],
};

const DRYOFF: EntityDescriptor = EntityDescriptor {
    kind: EntityKind::Dryoff,
    key: "dryoffs",
    table: "dryoffs",
    predicate: ScopePredicate::FarmAndLivestock,
    fields: &["dryoffDate", "reason", "expectedCalvingDate", "remarks"],
};

const TRANSFER: EntityDescriptor = EntityDescriptor {
    kind: EntityKind::Transfer,
    key: "transfers",
    table: "transfers",
    predicate: ScopePredicate::SourceOrDestinationFarm,
    fields: &["transferDate", "reason", "remarks"],
};

impl EntityKind {
    /// Every syncable kind, livestock first
    pub const ALL: [Self; 14] = [
        Self::Livestock,
        Self::Feeding,
        Self::WeightChange,
        Self::Deworming,
        Self::Medication,
        Self::Vaccination,
        Self::Disposal,
        Self::BirthEvent,
        Self::AbortedPregnancy,
        Self::Milking,
        Self::Pregnancy,
        Self::Insemination,
        Self::Dryoff,
        Self::Transfer,
    ];

    /// The husbandry log kinds that make up a composite pull
    pub const LOGS: [Self; 13] = [
        Self::Feeding,
        Self::WeightChange,
        Self::Deworming,
        Self::Medication,
        Self::Vaccination,
        Self::Disposal,
        Self::BirthEvent,
        Self::AbortedPregnancy,
        Self::Milking,
        Self::Pregnancy,
        Self::Insemination,
        Self::Dryoff,
        Self::Transfer,
    ];

    pub const fn descriptor(self) -> &'static EntityDescriptor {
        match self {
            Self::Livestock => &LIVESTOCK,
            Self::Feeding => &FEEDING,
            Self::WeightChange => &WEIGHT_CHANGE,
            Self::Deworming => &DEWORMING,
            Self::Medication => &MEDICATION,
            Self::Vaccination => &VACCINATION,
            Self::Disposal => &DISPOSAL,
            Self::BirthEvent => &BIRTH_EVENT,
            Self::AbortedPregnancy => &ABORTED_PREGNANCY,
            Self::Milking => &MILKING,
            Self::Pregnancy => &PREGNANCY,
            Self::Insemination => &INSEMINATION,
            Self::Dryoff => &DRYOFF,
            Self::Transfer => &TRANSFER,
        }
    }

    /// Wire key for this kind
    pub const fn key(self) -> &'static str {
        self.descriptor().key
    }

    /// Backing table name
    pub const fn table(self) -> &'static str {
        self.descriptor().table
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}

impl FromStr for EntityKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|kind| kind.key() == s)
            .ok_or_else(|| format!("unknown entity type: {s}"))
    }
}

impl EntityDescriptor {
    /// Whether rows carry a `livestock_uuid` column value
    pub const fn tracks_livestock(&self) -> bool {
        !matches!(self.predicate, ScopePredicate::FarmOnly)
    }

    /// Whether rows carry a destination farm
    pub const fn tracks_destination(&self) -> bool {
        matches!(self.predicate, ScopePredicate::SourceOrDestinationFarm)
    }

    /// Extract the ownership columns this kind requires from a payload.
    ///
    /// Returns `None` when any required field is missing or is not a UUID.
    pub fn ownership(&self, payload: &Map<String, Value>) -> Option<Ownership> {
        let farm_uuid = uuid_field(payload, FARM_UUID)?;
        let livestock_uuid = if self.tracks_livestock() {
            Some(uuid_field(payload, LIVESTOCK_UUID)?)
        } else {
            None
        };
        let to_farm_uuid = if self.tracks_destination() {
            Some(uuid_field(payload, TO_FARM_UUID)?)
        } else {
            None
        };
        Some(Ownership {
            farm_uuid,
            livestock_uuid,
            to_farm_uuid,
        })
    }

    /// Keep only the declared payload fields.
    pub fn sanitize(&self, payload: &Map<String, Value>) -> Map<String, Value> {
        self.fields
            .iter()
            .filter_map(|field| {
                payload
                    .get(*field)
                    .map(|value| ((*field).to_string(), value.clone()))
            })
            .collect()
    }
}

/// Read a UUID-valued string field from a payload.
pub fn uuid_field(payload: &Map<String, Value>, field: &str) -> Option<Uuid> {
    payload.get(field)?.as_str()?.parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn object(value: Value) -> Map<String, Value> {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn kinds_serialize_as_wire_keys() {
        for kind in EntityKind::ALL {
            let encoded = serde_json::to_value(kind).unwrap();
            assert_eq!(encoded, Value::String(kind.key().to_string()));
            assert_eq!(kind.key().parse::<EntityKind>().unwrap(), kind);
        }
    }

    #[test]
    fn tables_are_unique() {
        let mut tables: Vec<_> = EntityKind::ALL.iter().map(|kind| kind.table()).collect();
        tables.sort_unstable();
        tables.dedup();
        assert_eq!(tables.len(), EntityKind::ALL.len());
    }

    #[test]
    fn only_transfers_use_destination_predicate() {
        for kind in EntityKind::ALL {
            let expected = kind == EntityKind::Transfer;
            assert_eq!(kind.descriptor().tracks_destination(), expected, "{kind}");
        }
        assert!(!EntityKind::Livestock.descriptor().tracks_livestock());
        assert!(EntityKind::Transfer.descriptor().tracks_livestock());
    }

    #[test]
    fn logs_exclude_livestock() {
        assert!(!EntityKind::LOGS.contains(&EntityKind::Livestock));
        assert_eq!(EntityKind::LOGS.len() + 1, EntityKind::ALL.len());
    }

    #[test]
    fn ownership_requires_livestock_for_logs() {
        let farm = Uuid::now_v7();
        let payload = object(json!({ "farmUuid": farm.to_string() }));

        assert!(EntityKind::Feeding.descriptor().ownership(&payload).is_none());

        let owner = EntityKind::Livestock
            .descriptor()
            .ownership(&payload)
            .unwrap();
        assert_eq!(owner.farm_uuid, farm);
        assert_eq!(owner.livestock_uuid, None);
    }

    #[test]
    fn ownership_requires_destination_for_transfers() {
        let farm = Uuid::now_v7();
        let animal = Uuid::now_v7();
        let payload = object(json!({
            "farmUuid": farm.to_string(),
            "livestockUuid": animal.to_string(),
        }));
        assert!(EntityKind::Transfer.descriptor().ownership(&payload).is_none());

        let mut with_destination = payload;
        let destination = Uuid::now_v7();
        with_destination.insert(TO_FARM_UUID.into(), json!(destination.to_string()));
        let owner = EntityKind::Transfer
            .descriptor()
            .ownership(&with_destination)
            .unwrap();
        assert_eq!(owner.to_farm_uuid, Some(destination));
    }

    #[test]
    fn ownership_rejects_malformed_uuid() {
        let payload = object(json!({ "farmUuid": "F1" }));
        assert!(EntityKind::Livestock.descriptor().ownership(&payload).is_none());
    }

    #[test]
    fn sanitize_drops_undeclared_fields() {
        let payload = object(json!({
            "abortionDate": "2024-03-01",
            "isDeleted": true,
            "serverId": 4,
        }));
        let clean = EntityKind::AbortedPregnancy
            .descriptor()
            .sanitize(&payload);
        assert_eq!(clean.len(), 1);
        assert!(clean.contains_key("abortionDate"));
    }
}
