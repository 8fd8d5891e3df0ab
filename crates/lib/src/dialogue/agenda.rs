//! Agenda point rules: splitting free text into points, validating and normalizing them,
//! and combining confirmed points with the current agenda.

use super::state::AgendaEdit;

/// Most points accepted in a single input.
pub const MAX_POINTS_PER_INPUT: usize = 10;

/// Most words in a single point.
pub const MAX_WORDS_PER_POINT: usize = 20;

pub const EMPTY_INPUT: &str = "La entrada no puede estar vacía.";

/// Agenda sent when none was collected or found.
pub fn placeholder_agenda() -> Vec<String> {
    [1, 2, 3, 8, 9, 10]
        .iter()
        .map(|n| format!("Punto {} de la agenda", n))
        .collect()
}

/// Split raw input into candidate points: one per line when the input has several lines,
/// otherwise one per comma. List markers are stripped and whitespace trimmed.
///
/// Lines are never split further, so multi-line input may carry commas inside a point
/// ("Metas, KPIs y presupuesto"). Mixed input such as "a, b\nc" yields `["a, b", "c"]`.
pub fn split_points(input: &str) -> Vec<String> {
    let input = input.trim();
    if input.is_empty() {
        return Vec::new();
    }
    let pieces: Vec<&str> = if input.contains('\n') {
        input.lines().collect()
    } else {
        input.split(',').collect()
    };
    pieces
        .into_iter()
        .map(|p| strip_list_marker(p.trim()).trim().to_string())
        .collect()
}

/// Remove a leading "-", "*", "•", "1." or "1)" marker followed by whitespace.
fn strip_list_marker(item: &str) -> &str {
    for bullet in ["-", "*", "•"] {
        if let Some(rest) = item.strip_prefix(bullet) {
            if rest.starts_with(char::is_whitespace) {
                return rest;
            }
        }
    }
    let digits = item.len() - item.trim_start_matches(|c: char| c.is_ascii_digit()).len();
    if digits > 0 {
        let rest = &item[digits..];
        if let Some(after) = rest.strip_prefix('.').or_else(|| rest.strip_prefix(')')) {
            if after.starts_with(char::is_whitespace) {
                return after;
            }
        }
    }
    item
}

/// Uppercase the first character, leave the rest untouched.
pub fn capitalize_first(point: &str) -> String {
    let mut chars = point.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

/// Validate agenda input. Ok holds the normalized points; Err holds one message per problem.
pub fn validate_points(input: &str) -> Result<Vec<String>, Vec<String>> {
    let points = split_points(input);
    if points.is_empty() {
        return Err(vec![EMPTY_INPUT.to_string()]);
    }
    if points.len() > MAX_POINTS_PER_INPUT {
        return Err(vec![format!(
            "Puedes enviar como máximo {} puntos a la vez (recibí {}).",
            MAX_POINTS_PER_INPUT,
            points.len()
        )]);
    }

    let mut errors = Vec::new();
    for (i, point) in points.iter().enumerate() {
        let n = i + 1;
        let words = point.split_whitespace().count();
        if words == 0 {
            errors.push(format!("El punto {} está vacío.", n));
        } else if words > MAX_WORDS_PER_POINT {
            errors.push(format!(
                "El punto {} tiene {} palabras; el máximo es {}.",
                n, words, MAX_WORDS_PER_POINT
            ));
        } else if !point.chars().any(char::is_alphabetic) {
            errors.push(format!("El punto {} debe contener al menos una letra.", n));
        }
    }
    if !errors.is_empty() {
        return Err(errors);
    }
    Ok(points.iter().map(|p| capitalize_first(p)).collect())
}

/// Agenda after applying confirmed points.
pub fn merge(current: &[String], points: &[String], edit: AgendaEdit) -> Vec<String> {
    match edit {
        AgendaEdit::Append => current.iter().chain(points).cloned().collect(),
        AgendaEdit::Replace => points.to_vec(),
    }
}

/// Numbered list, one point per line.
pub fn format_agenda(points: &[String]) -> String {
    points
        .iter()
        .enumerate()
        .map(|(i, p)| format!("{}. {}", i + 1, p))
        .collect::<Vec<_>>()
        .join("\n")
}
