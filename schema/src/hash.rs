//! Deterministic schema hashing.

use blake3::Hasher;

use crate::{FieldCodec, FixedPoint, Schema};

/// Computes a deterministic hash identifying a schema definition.
///
/// Class ids, class names, field ids and codecs contribute; field names are
/// display-only and do not.
#[must_use]
pub fn schema_hash(schema: &Schema) -> u64 {
    let mut hasher = Hasher::new();
    hasher.update(&(schema.classes.len() as u32).to_le_bytes());

    for class in &schema.classes {
        hasher.update(&class.id.get().to_le_bytes());
        hasher.update(&(class.name.len() as u32).to_le_bytes());
        hasher.update(class.name.as_bytes());
        hasher.update(&(class.fields.len() as u32).to_le_bytes());
        for field in &class.fields {
            hasher.update(&field.id.get().to_le_bytes());
            hash_codec(&mut hasher, field.codec);
        }
    }

    let digest = hasher.finalize();
    let mut prefix = [0u8; 8];
    prefix.copy_from_slice(&digest.as_bytes()[..8]);
    u64::from_le_bytes(prefix)
}

fn hash_codec(hasher: &mut Hasher, codec: FieldCodec) {
    match codec {
        FieldCodec::Bool => hasher.update(&[0]),
        FieldCodec::UInt { bits } => hasher.update(&[1, bits]),
        FieldCodec::SInt { bits } => hasher.update(&[2, bits]),
        FieldCodec::VarUInt => hasher.update(&[3]),
        FieldCodec::VarSInt => hasher.update(&[4]),
        FieldCodec::FixedPoint(FixedPoint {
            min_q,
            max_q,
            scale,
        }) => hasher
            .update(&[5])
            .update(&min_q.to_le_bytes())
            .update(&max_q.to_le_bytes())
            .update(&scale.to_le_bytes()),
    };
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{ClassDef, ClassId, FieldDef, FieldId};

    fn cid(value: u16) -> ClassId {
        ClassId::new(value)
    }

    fn fid(value: u16) -> FieldId {
        FieldId::new(value)
    }

    #[test]
    fn schema_hash_is_stable() {
        let class = ClassDef::new(cid(1), "Player")
            .field(FieldDef::new(fid(1), FieldCodec::bool()))
            .field(FieldDef::new(fid(2), FieldCodec::uint(8)));
        let schema = Schema::new(vec![class]).unwrap();

        assert_eq!(schema_hash(&schema), schema_hash(&schema.clone()));
    }

    #[test]
    fn schema_hash_ignores_field_names() {
        let plain = ClassDef::new(cid(1), "Player").field(FieldDef::new(fid(1), FieldCodec::bool()));
        let named = ClassDef::new(cid(1), "Player")
            .field(FieldDef::new(fid(1), FieldCodec::bool()).named("alive"));

        let a = Schema::new(vec![plain]).unwrap();
        let b = Schema::new(vec![named]).unwrap();
        assert_eq!(schema_hash(&a), schema_hash(&b));
    }

    #[test]
    fn schema_hash_changes_with_class_order() {
        let c1 = ClassDef::new(cid(1), "A").field(FieldDef::new(fid(1), FieldCodec::bool()));
        let c2 = ClassDef::new(cid(2), "B").field(FieldDef::new(fid(1), FieldCodec::uint(8)));

        let schema_a = Schema::new(vec![c1.clone(), c2.clone()]).unwrap();
        let schema_b = Schema::new(vec![c2, c1]).unwrap();

        assert_ne!(schema_hash(&schema_a), schema_hash(&schema_b));
    }

    #[test]
    fn schema_hash_changes_with_field_codec() {
        let c1 = ClassDef::new(cid(1), "A").field(FieldDef::new(fid(1), FieldCodec::uint(8)));
        let c2 = ClassDef::new(cid(1), "A").field(FieldDef::new(fid(1), FieldCodec::uint(9)));

        let schema_a = Schema::new(vec![c1]).unwrap();
        let schema_b = Schema::new(vec![c2]).unwrap();

        assert_ne!(schema_hash(&schema_a), schema_hash(&schema_b));
    }

    #[test]
    fn schema_hash_changes_with_class_name() {
        let a = Schema::new(vec![ClassDef::new(cid(1), "A")]).unwrap();
        let b = Schema::new(vec![ClassDef::new(cid(1), "B")]).unwrap();
        assert_ne!(schema_hash(&a), schema_hash(&b));
    }
}
