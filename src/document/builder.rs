//! Fluent construction of [`Document`]s.
//!
//! The builders mirror the nesting of a written document; `build` lowers the
//! tree into the document's selection-set arena.

use std::sync::Arc;

use rustc_hash::FxHashMap;
use serde_json::Value as JsonValue;

use super::{
    ArgValue, Directive, Document, FieldNode, FragmentDefinition, Selection, SelectionSet,
    SelectionSetId, VariableDefinition,
};
use crate::types::OperationKind;

/// Builder for a whole operation document.
#[derive(Debug)]
pub struct DocumentBuilder {
    kind: OperationKind,
    name: Option<String>,
    variables: Vec<VariableDefinition>,
    directives: Vec<Directive>,
    selections: SelectionSetBuilder,
    fragments: Vec<(String, String, SelectionSetBuilder)>,
}

impl DocumentBuilder {
    /// Starts an anonymous operation of the given kind.
    pub fn new(kind: OperationKind) -> Self {
        Self {
            kind,
            name: None,
            variables: Vec::new(),
            directives: Vec::new(),
            selections: SelectionSetBuilder::new(),
            fragments: Vec::new(),
        }
    }

    /// Starts a named query.
    pub fn query(name: impl Into<String>) -> Self {
        Self::new(OperationKind::Query).named(name)
    }

    /// Starts a named mutation.
    pub fn mutation(name: impl Into<String>) -> Self {
        Self::new(OperationKind::Mutation).named(name)
    }

    /// Starts a named subscription.
    pub fn subscription(name: impl Into<String>) -> Self {
        Self::new(OperationKind::Subscription).named(name)
    }

    /// Sets the operation name.
    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Declares a variable without default.
    pub fn variable(mut self, name: impl Into<String>) -> Self {
        self.variables.push(VariableDefinition {
            name: name.into(),
            default_value: None,
        });
        self
    }

    /// Declares a variable with a default value.
    pub fn variable_with_default(mut self, name: impl Into<String>, default: JsonValue) -> Self {
        self.variables.push(VariableDefinition {
            name: name.into(),
            default_value: Some(default),
        });
        self
    }

    /// Adds an operation-level directive.
    pub fn directive(mut self, directive: Directive) -> Self {
        self.directives.push(directive);
        self
    }

    /// Replaces the root selection set.
    pub fn select(mut self, selections: SelectionSetBuilder) -> Self {
        self.selections = selections;
        self
    }

    /// Adds a named fragment definition.
    pub fn fragment(
        mut self,
        name: impl Into<String>,
        type_condition: impl Into<String>,
        selections: SelectionSetBuilder,
    ) -> Self {
        self.fragments
            .push((name.into(), type_condition.into(), selections));
        self
    }

    /// Lowers the builder tree into an immutable document.
    pub fn build(self) -> Arc<Document> {
        let mut sets = Vec::new();
        let root = lower(self.selections, &mut sets);
        let mut fragments = FxHashMap::default();
        for (name, type_condition, selections) in self.fragments {
            let selection_set = lower(selections, &mut sets);
            fragments.insert(
                name.clone(),
                FragmentDefinition {
                    name,
                    type_condition,
                    selection_set,
                },
            );
        }
        Arc::new(Document::from_parts(
            self.kind,
            self.name,
            self.variables,
            self.directives,
            root,
            fragments,
            sets,
        ))
    }
}

#[derive(Debug)]
enum SelectionBuilder {
    Field(FieldBuilder),
    Inline {
        type_condition: Option<String>,
        directives: Vec<Directive>,
        selections: SelectionSetBuilder,
    },
    Spread {
        name: String,
        directives: Vec<Directive>,
    },
}

/// Builder for a selection set.
#[derive(Debug, Default)]
pub struct SelectionSetBuilder {
    items: Vec<SelectionBuilder>,
}

impl SelectionSetBuilder {
    /// Creates an empty selection set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a leaf field by name.
    pub fn field(self, name: impl Into<String>) -> Self {
        self.field_with(FieldBuilder::new(name))
    }

    /// Adds a fully configured field.
    pub fn field_with(mut self, field: FieldBuilder) -> Self {
        self.items.push(SelectionBuilder::Field(field));
        self
    }

    /// Adds a composite field with a sub-selection.
    pub fn object(self, name: impl Into<String>, selections: SelectionSetBuilder) -> Self {
        self.field_with(FieldBuilder::new(name).select(selections))
    }

    /// Adds an inline fragment.
    pub fn inline_fragment(
        self,
        type_condition: Option<&str>,
        selections: SelectionSetBuilder,
    ) -> Self {
        self.inline_fragment_with(type_condition, Vec::new(), selections)
    }

    /// Adds an inline fragment with directives.
    pub fn inline_fragment_with(
        mut self,
        type_condition: Option<&str>,
        directives: Vec<Directive>,
        selections: SelectionSetBuilder,
    ) -> Self {
        self.items.push(SelectionBuilder::Inline {
            type_condition: type_condition.map(str::to_owned),
            directives,
            selections,
        });
        self
    }

    /// Adds a named fragment spread.
    pub fn spread(self, name: impl Into<String>) -> Self {
        self.spread_with(name, Vec::new())
    }

    /// Adds a named fragment spread with directives.
    pub fn spread_with(mut self, name: impl Into<String>, directives: Vec<Directive>) -> Self {
        self.items.push(SelectionBuilder::Spread {
            name: name.into(),
            directives,
        });
        self
    }
}

/// Builder for one field selection.
#[derive(Debug)]
pub struct FieldBuilder {
    name: String,
    alias: Option<String>,
    arguments: Vec<(String, ArgValue)>,
    directives: Vec<Directive>,
    type_name: Option<String>,
    non_null: bool,
    selections: Option<SelectionSetBuilder>,
}

impl FieldBuilder {
    /// Starts a nullable leaf field.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            alias: None,
            arguments: Vec::new(),
            directives: Vec::new(),
            type_name: None,
            non_null: false,
            selections: None,
        }
    }

    /// Sets the response alias.
    pub fn alias(mut self, alias: impl Into<String>) -> Self {
        self.alias = Some(alias.into());
        self
    }

    /// Adds an argument.
    pub fn arg(mut self, name: impl Into<String>, value: impl Into<ArgValue>) -> Self {
        self.arguments.push((name.into(), value.into()));
        self
    }

    /// Adds a directive.
    pub fn directive(mut self, directive: Directive) -> Self {
        self.directives.push(directive);
        self
    }

    /// Annotates the named return type.
    pub fn typed(mut self, type_name: impl Into<String>) -> Self {
        self.type_name = Some(type_name.into());
        self
    }

    /// Marks the field non-null.
    pub fn non_null(mut self) -> Self {
        self.non_null = true;
        self
    }

    /// Attaches a sub-selection.
    pub fn select(mut self, selections: SelectionSetBuilder) -> Self {
        self.selections = Some(selections);
        self
    }
}

fn lower(builder: SelectionSetBuilder, sets: &mut Vec<SelectionSet>) -> SelectionSetId {
    let id = SelectionSetId(sets.len() as u32);
    sets.push(SelectionSet::default());
    let mut selections = Vec::with_capacity(builder.items.len());
    for item in builder.items {
        let selection = match item {
            SelectionBuilder::Field(field) => {
                let selection_set = field.selections.map(|child| lower(child, sets));
                Selection::Field(FieldNode {
                    name: field.name,
                    alias: field.alias,
                    arguments: field.arguments,
                    directives: field.directives,
                    type_name: field.type_name,
                    non_null: field.non_null,
                    selection_set,
                })
            }
            SelectionBuilder::Inline {
                type_condition,
                directives,
                selections,
            } => Selection::InlineFragment {
                type_condition,
                directives,
                selection_set: lower(selections, sets),
            },
            SelectionBuilder::Spread { name, directives } => {
                Selection::FragmentSpread { name, directives }
            }
        };
        selections.push(selection);
    }
    sets[id.0 as usize].selections = selections;
    id
}
