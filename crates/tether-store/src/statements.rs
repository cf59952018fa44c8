//! Statement compiler
//!
//! Generates the parameterized SQL for a schema: the core insert / update /
//! select / delete statements, the per-relation decouple and populate
//! statements, and the table-creation batch. Identifiers come from schema
//! declarations, never from external input; all values bind as parameters.

use tether_core::errors::{Result, TetherError};
use tether_core::record::RecordVtable;
use tether_core::schema::{EntitySchema, StoredColumn, ToManyDef};

/// Statements maintaining one to-many relation field
#[derive(Debug, Clone)]
pub struct RelationStatements {
    /// The owner's collection field
    pub field: &'static str,
    /// Type name of the child record
    pub target: &'static str,
    /// Inverse to-one field on the child, resolved at compile time
    pub inverse: &'static str,
    /// Nulls the foreign key of every current child of a doomed record
    pub decouple: String,
    /// Selects child ids for a parent id, ordered by child id
    pub populate: String,
    pub target_vtable: fn() -> RecordVtable,
}

/// The compiled statement set for one record type
#[derive(Debug, Clone)]
pub struct CompiledStatements {
    pub insert: String,
    pub update: String,
    pub select: String,
    pub delete: String,
    pub relations: Vec<RelationStatements>,
}

/// Compile the statement set for a schema
///
/// # Errors
///
/// Returns `InverseNotFound` or `AmbiguousInverse` when a to-many field
/// cannot be matched to exactly one to-one field on its target type.
pub fn compile(schema: &EntitySchema) -> Result<CompiledStatements> {
    let table = schema.name();
    let id_field = schema.id_field();

    let mut insert_columns = Vec::new();
    let mut placeholders = Vec::new();
    let mut assignments = Vec::new();
    let mut select_columns = vec![format!("\"{}\"", id_field)];

    for (index, column) in schema.stored().iter().enumerate() {
        let field = column.field();
        insert_columns.push(format!("\"{}\"", field));
        placeholders.push(format!("?{}", index + 1));
        assignments.push(format!("\"{}\" = ?{}", field, index + 1));
        select_columns.push(format!("\"{}\"", field));
    }

    let insert = if insert_columns.is_empty() {
        format!("INSERT INTO \"{}\" DEFAULT VALUES", table)
    } else {
        format!(
            "INSERT INTO \"{}\" ({}) VALUES ({})",
            table,
            insert_columns.join(", "),
            placeholders.join(", ")
        )
    };

    // A type with no stored columns still needs a row-touching update so
    // the rows-affected count drives the NotFound contract.
    let update = if assignments.is_empty() {
        format!(
            "UPDATE \"{}\" SET \"{}\" = \"{}\" WHERE \"{}\" = ?1",
            table, id_field, id_field, id_field
        )
    } else {
        format!(
            "UPDATE \"{}\" SET {} WHERE \"{}\" = ?{}",
            table,
            assignments.join(", "),
            id_field,
            schema.stored().len() + 1
        )
    };

    let select = format!(
        "SELECT {} FROM \"{}\" WHERE \"{}\" = ?1",
        select_columns.join(", "),
        table,
        id_field
    );

    let delete = format!("DELETE FROM \"{}\" WHERE \"{}\" = ?1", table, id_field);

    let mut relations = Vec::with_capacity(schema.to_many().len());
    for def in schema.to_many() {
        relations.push(compile_relation(schema, def)?);
    }

    Ok(CompiledStatements {
        insert,
        update,
        select,
        delete,
        relations,
    })
}

fn compile_relation(owner: &EntitySchema, def: &ToManyDef) -> Result<RelationStatements> {
    let target_schema = ((def.target_vtable)().schema)()?;
    let inverse = resolve_inverse(owner, def, &target_schema)?;

    let decouple = format!(
        "UPDATE \"{}\" SET \"{}\" = NULL WHERE \"{}\" = ?1",
        def.target, inverse, inverse
    );
    let populate = format!(
        "SELECT \"{}\" FROM \"{}\" WHERE \"{}\" = ?1 ORDER BY \"{}\"",
        target_schema.id_field(),
        def.target,
        inverse,
        target_schema.id_field()
    );

    Ok(RelationStatements {
        field: def.field,
        target: def.target,
        inverse,
        decouple,
        populate,
        target_vtable: def.target_vtable,
    })
}

/// Resolve the inverse to-one field on the target pointing back at the
/// owner; exactly one candidate must exist
fn resolve_inverse(
    owner: &EntitySchema,
    def: &ToManyDef,
    target_schema: &EntitySchema,
) -> Result<&'static str> {
    let candidates = target_schema.inverse_candidates(owner.name());
    match candidates.as_slice() {
        [] => Err(TetherError::InverseNotFound {
            owner: owner.name().to_string(),
            field: def.field.to_string(),
            target: def.target.to_string(),
        }),
        [single] => Ok(single.field),
        _ => Err(TetherError::AmbiguousInverse {
            owner: owner.name().to_string(),
            target: def.target.to_string(),
            candidates: candidates
                .iter()
                .map(|candidate| candidate.field.to_string())
                .collect(),
        }),
    }
}

/// Build the table-creation batch for a schema: bracketed by disabling and
/// re-enabling foreign-key checking so mutually referencing tables can be
/// recreated in any order
///
/// # Errors
///
/// Fails if a referenced target type's schema does not build.
pub fn create_table_batch(schema: &EntitySchema) -> Result<Vec<String>> {
    let mut columns = vec![format!(
        "\"{}\" INTEGER PRIMARY KEY AUTOINCREMENT",
        schema.id_field()
    )];

    for column in schema.stored() {
        match column {
            StoredColumn::Scalar(def) => {
                columns.push(format!("\"{}\" {}", def.field, def.sql_type));
            }
            StoredColumn::Reference(def) => {
                columns.push(format!("\"{}\" INTEGER", def.field));
            }
        }
    }

    for def in schema.to_one() {
        let target_schema = ((def.target_vtable)().schema)()?;
        columns.push(format!(
            "FOREIGN KEY (\"{}\") REFERENCES \"{}\"(\"{}\")",
            def.field,
            def.target,
            target_schema.id_field()
        ));
    }

    Ok(vec![
        "PRAGMA foreign_keys = OFF".to_string(),
        format!("DROP TABLE IF EXISTS \"{}\"", schema.name()),
        format!("CREATE TABLE \"{}\" ({})", schema.name(), columns.join(", ")),
        "PRAGMA foreign_keys = ON".to_string(),
    ])
}
