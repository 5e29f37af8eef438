//! Schema definitions and validation.

use std::collections::HashSet;

use crate::error::{SchemaError, SchemaResult};
use crate::{ClassId, FieldCodec, FieldDef, FixedPoint};

/// A networked class: an ordered list of property fields.
///
/// A field's position in `fields` is its property index on the wire.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ClassDef {
    pub id: ClassId,
    pub name: String,
    pub fields: Vec<FieldDef>,
}

impl ClassDef {
    /// Creates a new class with no fields.
    #[must_use]
    pub fn new(id: ClassId, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            fields: Vec::new(),
        }
    }

    /// Adds a field to the class.
    #[must_use]
    pub fn field(mut self, field: FieldDef) -> Self {
        self.fields.push(field);
        self
    }

    /// Looks up a field by its property index.
    #[must_use]
    pub fn field_at(&self, index: usize) -> Option<&FieldDef> {
        self.fields.get(index)
    }
}

/// A validated set of classes.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Schema {
    pub classes: Vec<ClassDef>,
}

impl Schema {
    /// Creates a schema from classes after validation.
    pub fn new(classes: Vec<ClassDef>) -> SchemaResult<Self> {
        let schema = Self { classes };
        schema.validate()?;
        Ok(schema)
    }

    #[must_use]
    pub fn builder() -> SchemaBuilder {
        SchemaBuilder::default()
    }

    /// Finds a class by id.
    #[must_use]
    pub fn class(&self, id: ClassId) -> Option<&ClassDef> {
        self.classes.iter().find(|class| class.id == id)
    }

    /// Validates schema invariants.
    pub fn validate(&self) -> SchemaResult<()> {
        let mut class_ids = HashSet::new();
        for class in &self.classes {
            if !class_ids.insert(class.id) {
                return Err(SchemaError::DuplicateClassId { id: class.id });
            }

            let mut field_ids = HashSet::new();
            for field in &class.fields {
                if !field_ids.insert(field.id) {
                    return Err(SchemaError::DuplicateFieldId {
                        class: class.id,
                        field: field.id,
                    });
                }
                validate_field(class.id, field)?;
            }
        }
        Ok(())
    }
}

/// Builder for `Schema`.
#[derive(Debug, Default)]
pub struct SchemaBuilder {
    classes: Vec<ClassDef>,
}

impl SchemaBuilder {
    /// Adds a class definition.
    #[must_use]
    pub fn class(mut self, class: ClassDef) -> Self {
        self.classes.push(class);
        self
    }

    /// Builds the schema after validation.
    pub fn build(self) -> SchemaResult<Schema> {
        Schema::new(self.classes)
    }
}

fn validate_field(class: ClassId, field: &FieldDef) -> SchemaResult<()> {
    match field.codec {
        FieldCodec::UInt { bits } | FieldCodec::SInt { bits } => {
            if bits == 0 || bits > 64 {
                return Err(SchemaError::InvalidBitWidth {
                    class,
                    field: field.id,
                    bits,
                });
            }
        }
        FieldCodec::FixedPoint(fp) => {
            validate_fixed_point(class, field, fp)?;
        }
        FieldCodec::Bool | FieldCodec::VarUInt | FieldCodec::VarSInt => {}
    }
    Ok(())
}

fn validate_fixed_point(class: ClassId, field: &FieldDef, fp: FixedPoint) -> SchemaResult<()> {
    if fp.scale == 0 {
        return Err(SchemaError::InvalidFixedPointScale {
            class,
            field: field.id,
        });
    }
    if fp.min_q > fp.max_q {
        return Err(SchemaError::InvalidFixedPointRange {
            min_q: fp.min_q,
            max_q: fp.max_q,
        });
    }
    Ok(())
}
