//! Directive extraction over a parsed schema document.
//!
//! `extract` is total: any syntactically valid document produces metadata.
//! The join-table accumulator is local to each call and threaded through
//! explicitly, so concurrent extractions never share state.

use std::collections::{BTreeSet, HashMap};

use graphql_parser::schema::{
    parse_schema, Definition, Directive, Document, Field, InputValue, Type, TypeDefinition,
    TypeExtension,
};
use tracing::debug;

use super::directive::{
    declared_return_shape, field_directive, has_task_marker, type_directive, DirectiveKind,
};
use super::metadata::{ArgumentMetadata, FieldMetadata, SchemaMetadata, TypeMetadata};
use crate::compiler::collect_join_tables;
use crate::{Error, Result};

pub const DEFAULT_QUERY_TYPE: &str = "Query";
pub const DEFAULT_MUTATION_TYPE: &str = "Mutation";

/// Parse GraphQL SDL and extract its metadata.
pub fn extract_sdl(text: &str) -> Result<SchemaMetadata> {
    let doc = parse_schema::<String>(text).map_err(|e| Error::SchemaParse(e.to_string()))?;
    Ok(extract(&doc))
}

/// Object type with any `extend type` blocks folded in.
struct ObjectParts<'d, 'a> {
    name: &'d str,
    fields: Vec<&'d Field<'a, String>>,
    directives: Vec<Directive<'a, String>>,
}

struct RootNames {
    query: String,
    mutation: String,
}

impl RootNames {
    fn from_document(doc: &Document<'_, String>) -> Self {
        let mut roots = Self {
            query: DEFAULT_QUERY_TYPE.to_string(),
            mutation: DEFAULT_MUTATION_TYPE.to_string(),
        };
        for def in &doc.definitions {
            if let Definition::SchemaDefinition(schema) = def {
                if let Some(q) = &schema.query {
                    roots.query = q.clone();
                }
                if let Some(m) = &schema.mutation {
                    roots.mutation = m.clone();
                }
            }
        }
        roots
    }
}

pub fn extract(doc: &Document<'_, String>) -> SchemaMetadata {
    let roots = RootNames::from_document(doc);
    let mut join_tables = BTreeSet::new();

    let mut objects: Vec<ObjectParts<'_, '_>> = Vec::new();
    let mut object_index: HashMap<&str, usize> = HashMap::new();
    let mut scalars: Vec<&str> = Vec::new();
    let mut enums: Vec<String> = Vec::new();

    for def in &doc.definitions {
        match def {
            Definition::TypeDefinition(TypeDefinition::Object(obj)) => {
                let parts = object_parts(&mut objects, &mut object_index, &obj.name);
                parts.fields.extend(obj.fields.iter());
                parts.directives.extend(obj.directives.iter().cloned());
            }
            Definition::TypeExtension(TypeExtension::Object(ext)) => {
                let parts = object_parts(&mut objects, &mut object_index, &ext.name);
                parts.fields.extend(ext.fields.iter());
                parts.directives.extend(ext.directives.iter().cloned());
            }
            Definition::TypeDefinition(TypeDefinition::Scalar(scalar)) => {
                scalars.push(&scalar.name);
            }
            Definition::TypeDefinition(TypeDefinition::Enum(e)) => {
                enums.push(e.name.clone());
            }
            _ => {}
        }
    }

    let mut types = Vec::new();
    let mut queries = Vec::new();
    let mut mutations = Vec::new();

    for parts in &objects {
        if parts.name == roots.query {
            queries = extract_fields(&parts.fields, true, &mut join_tables);
        } else if parts.name == roots.mutation {
            mutations = extract_fields(&parts.fields, false, &mut join_tables);
        } else {
            let fields = extract_fields(&parts.fields, false, &mut join_tables);
            let directive = type_directive(&parts.directives);
            types.push(TypeMetadata {
                name: parts.name.to_string(),
                fields,
                resolver: matches!(directive, DirectiveKind::Resolver),
                primitive: false,
                task_response: matches!(directive, DirectiveKind::TaskResponse),
            });
        }
    }

    for name in scalars {
        types.push(TypeMetadata {
            name: name.to_string(),
            fields: Vec::new(),
            resolver: false,
            primitive: true,
            task_response: false,
        });
    }

    debug!(
        types = types.len(),
        queries = queries.len(),
        mutations = mutations.len(),
        enums = enums.len(),
        join_tables = join_tables.len(),
        "schema extracted"
    );

    SchemaMetadata {
        types,
        queries,
        mutations,
        enums,
        join_tables,
    }
}

fn object_parts<'o, 'd, 'a>(
    objects: &'o mut Vec<ObjectParts<'d, 'a>>,
    index: &mut HashMap<&'d str, usize>,
    name: &'d str,
) -> &'o mut ObjectParts<'d, 'a> {
    let i = *index.entry(name).or_insert_with(|| {
        objects.push(ObjectParts {
            name,
            fields: Vec::new(),
            directives: Vec::new(),
        });
        objects.len() - 1
    });
    &mut objects[i]
}

fn extract_fields(
    fields: &[&Field<'_, String>],
    root_query: bool,
    join_tables: &mut BTreeSet<String>,
) -> Vec<FieldMetadata> {
    fields
        .iter()
        .map(|field| extract_field(field, root_query, join_tables))
        .collect()
}

fn extract_field(
    field: &Field<'_, String>,
    root_query: bool,
    join_tables: &mut BTreeSet<String>,
) -> FieldMetadata {
    let (type_name, required, list) = unwrap_type(&field.field_type);
    let directive = field_directive(&field.directives);
    if let Some(template) = directive.template() {
        collect_join_tables(template, join_tables);
    }
    if has_task_marker(&field.directives) && !root_query {
        debug!(field = %field.name, "@task marker outside the root query type is ignored");
    }

    FieldMetadata {
        name: field.name.clone(),
        type_name,
        required,
        list,
        arguments: field.arguments.iter().map(extract_argument).collect(),
        directive,
        task: root_query,
        return_shape: declared_return_shape(&field.directives),
    }
}

fn extract_argument(arg: &InputValue<'_, String>) -> ArgumentMetadata {
    let (type_name, required, list) = unwrap_type(&arg.value_type);
    ArgumentMetadata {
        name: arg.name.clone(),
        type_name,
        required,
        list,
    }
}

/// Returns (innermost type name, outer non-null, any list wrapper).
fn unwrap_type(ty: &Type<'_, String>) -> (String, bool, bool) {
    let required = matches!(ty, Type::NonNullType(_));
    let mut list = false;
    let mut current = ty;
    loop {
        match current {
            Type::NamedType(name) => return (name.clone(), required, list),
            Type::ListType(inner) => {
                list = true;
                current = inner.as_ref();
            }
            Type::NonNullType(inner) => current = inner.as_ref(),
        }
    }
}
