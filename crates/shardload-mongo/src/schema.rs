use mongodb::bson::{doc, Bson, Document};

use shardload_core::types::{FieldValue, KeyingStrategy, Record, ValidationSchema};

/// `$jsonSchema` validator for a collection. Unlisted fields are unconstrained.
pub fn build_validator(schema: &ValidationSchema) -> Document {
    let mut properties = Document::new();
    for (field, ty) in &schema.field_types {
        let required = schema.required_fields.contains(field);
        let description = if required {
            format!("{} must be a {} and is required", field, ty)
        } else {
            format!("{} must be a {}", field, ty)
        };
        let property = doc! { "bsonType": ty.bson_type(), "description": description };
        properties.insert(field.clone(), property);
    }
    let required: Vec<Bson> =
        schema.required_fields.iter().map(|f| Bson::String(f.clone())).collect();
    doc! {
        "$jsonSchema": {
            "bsonType": "object",
            "required": required,
            "properties": properties,
        }
    }
}

pub fn shard_key(field: &str, strategy: KeyingStrategy) -> Document {
    let mut key = Document::new();
    match strategy {
        KeyingStrategy::Hashed => key.insert(field, "hashed"),
        KeyingStrategy::Ranged => key.insert(field, 1),
    };
    key
}

pub fn to_bson(value: &FieldValue) -> Bson {
    match value {
        FieldValue::Null => Bson::Null,
        FieldValue::Bool(b) => Bson::Boolean(*b),
        FieldValue::Int(i) => Bson::Int64(*i),
        FieldValue::Float(f) => Bson::Double(*f),
        FieldValue::Text(s) => Bson::String(s.clone()),
    }
}

pub fn to_document(record: &Record) -> Document {
    record.iter().map(|(k, v)| (k.clone(), to_bson(v))).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use shardload_core::catalog::station_schema;

    #[test]
    fn validator_lists_required_station_fields() {
        let validator = build_validator(&station_schema());
        let schema = validator.get_document("$jsonSchema").expect("jsonSchema");
        assert_eq!(schema.get_str("bsonType").expect("bsonType"), "object");
        let required: Vec<&str> = schema
            .get_array("required")
            .expect("required")
            .iter()
            .filter_map(Bson::as_str)
            .collect();
        assert_eq!(required, ["date", "location", "station_id"]);
        let station = schema
            .get_document("properties")
            .and_then(|p| p.get_document("station_id"))
            .expect("property");
        assert_eq!(station.get_str("bsonType").expect("type"), "string");
        assert_eq!(
            station.get_str("description").expect("description"),
            "station_id must be a string and is required"
        );
    }

    #[test]
    fn hashed_shard_key() {
        let hashed = shard_key("station_id", KeyingStrategy::Hashed);
        assert_eq!(hashed, doc! { "station_id": "hashed" });
        assert_eq!(shard_key("date", KeyingStrategy::Ranged), doc! { "date": 1 });
    }

    #[test]
    fn record_converts_field_by_field() {
        let record: Record = [
            ("station_id", FieldValue::Text("A1".into())),
            ("temperature_c", FieldValue::Float(12.5)),
            ("humidity_percent", FieldValue::Int(65)),
            ("verified", FieldValue::Bool(true)),
            ("note", FieldValue::Null),
        ]
        .into_iter()
        .collect();
        let document = to_document(&record);
        assert_eq!(document.get_str("station_id").expect("id"), "A1");
        assert_eq!(document.get_f64("temperature_c").expect("temp"), 12.5);
        assert_eq!(document.get_i64("humidity_percent").expect("humidity"), 65);
        assert!(document.get_bool("verified").expect("verified"));
        assert_eq!(document.get("note"), Some(&Bson::Null));
    }
}
