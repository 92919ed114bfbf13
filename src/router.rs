//! Sheet routing: free-text sheet names onto the six canonical entities.
//!
//! Rules are evaluated in order and the first match wins. Matching is
//! case-insensitive substring search on the sheet name.

use serde::Serialize;

use crate::{entity::Entity, workbook::Sheet};

pub struct RoutingRule {
    pub target: Entity,
    pub description: &'static str,
    matches: fn(&str) -> bool,
}

pub const RULES: &[RoutingRule] = &[
    RoutingRule {
        target: Entity::Unit,
        description: "name contains \"unidade\"",
        matches: is_unit,
    },
    RoutingRule {
        target: Entity::QuestionType,
        description: "name contains \"tipo\" and \"pergunta\"",
        matches: is_question_type,
    },
    RoutingRule {
        target: Entity::Question,
        description: "name contains \"pergunta\"",
        matches: is_question,
    },
    RoutingRule {
        target: Entity::Course,
        description: "name contains \"curso\" but not \"av\"",
        matches: is_course,
    },
    RoutingRule {
        target: Entity::Discipline,
        description: "name contains \"disciplina\"",
        matches: is_discipline,
    },
    RoutingRule {
        target: Entity::Evaluation,
        description: "name contains \"avalia\" or \"fato\"",
        matches: is_evaluation,
    },
];

fn is_unit(name: &str) -> bool {
    name.contains("unidade")
}

fn is_question_type(name: &str) -> bool {
    name.contains("tipo") && name.contains("pergunta")
}

fn is_question(name: &str) -> bool {
    name.contains("pergunta")
}

// "av" keeps evaluation sheets such as "CursosAvaliados" out of Course.
fn is_course(name: &str) -> bool {
    name.contains("curso") && !name.contains("av")
}

fn is_discipline(name: &str) -> bool {
    name.contains("disciplina")
}

fn is_evaluation(name: &str) -> bool {
    name.contains("avalia") || name.contains("fato")
}

/// Routing decision for one sheet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "decision", content = "entity", rename_all = "snake_case")]
pub enum Route {
    Target(Entity),
    /// No data rows; discarded before classification.
    Empty,
    Unclassified,
}

/// Index into [`RULES`] of the first rule matching `name`.
pub fn matching_rule(name: &str) -> Option<usize> {
    let lowered = name.to_lowercase();
    RULES.iter().position(|rule| (rule.matches)(&lowered))
}

pub fn classify_sheet_name(name: &str) -> Option<Entity> {
    matching_rule(name).map(|idx| RULES[idx].target)
}

pub fn route_sheet(sheet: &Sheet) -> Route {
    if sheet.is_empty() {
        return Route::Empty;
    }
    match classify_sheet_name(&sheet.name) {
        Some(entity) => Route::Target(entity),
        None => Route::Unclassified,
    }
}
