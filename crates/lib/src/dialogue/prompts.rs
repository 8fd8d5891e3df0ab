//! Button labels and user-facing texts.

use super::agenda::format_agenda;
use super::outbound::{HeroCard, OutboundMessage};
use super::state::Quarter;
use crate::fileshare::FileShareError;
use crate::reference::{Meeting, ReferenceError};

pub const GENERATE: &str = "Generar la presentación";
pub const VIEW_AGENDA: &str = "Consultar agenda";
pub const REVIEW_CONTENT: &str = "Revisar contenido de la sesión";
pub const YES: &str = "Sí";
pub const NO: &str = "No";
pub const CANCEL: &str = "Cancelar";
pub const ADD_POINTS: &str = "Agregar puntos";
pub const REPLACE_AGENDA: &str = "Reemplazar agenda";
pub const EDIT_WITH_ASSISTANT: &str = "Editar con asistente";
pub const CONTINUE: &str = "Continuar";
pub const RETRY: &str = "Reintentar";
pub const BACK_TO_START: &str = "Volver al inicio";

pub const GREETING: &str = "¡Hola! ¿Qué deseas hacer?";
pub const DIRECT_GREETING: &str = "¡Hola! Para la presentación de hoy, ¿qué trimestre deseas usar?";
pub const UNRECOGNIZED: &str = "No entendí tu respuesta. Elige una de las opciones:";
pub const ANYTHING_ELSE: &str = "¿Qué más deseas hacer?";
pub const LEADER_PROMPT: &str = "Escribe la matrícula del líder.";
pub const REPORT_FAILED: &str =
    "Lo siento, ocurrió un error al generar la presentación. Puedes intentarlo de nuevo.";
pub const TURN_FAILED: &str =
    "No pude recuperar el estado de la conversación. Por favor intenta de nuevo en unos momentos.";
pub const NO_UPCOMING_MEETING: &str = "No hay reuniones próximas registradas.";
pub const AGENDA_UPDATED: &str = "Agenda actualizada.";
pub const AGENDA_DISCARDED: &str = "Se descartaron los cambios.";
pub const WRITE_BACK_FAILED: &str =
    "No se pudo guardar la agenda en el archivo de reuniones; se usará solo para esta presentación.";
pub const CONTENT_INSTRUCTIONS_PROMPT: &str = "Describe los cambios que quieres hacer al contenido.";
pub const CONTENT_SAVED: &str = "Contenido de la sesión guardado.";
pub const REWRITE_FAILED: &str =
    "No fue posible editar el contenido en este momento. Intenta de nuevo.";
pub const REWRITE_UNAVAILABLE: &str = "La edición asistida no está disponible.";

/// Case-insensitive label match on trimmed input.
pub fn is_choice(text: &str, label: &str) -> bool {
    text.trim().to_lowercase() == label.to_lowercase()
}

pub fn is_yes(text: &str) -> bool {
    matches!(text.trim().to_lowercase().as_str(), "sí" | "si")
}

pub fn is_no(text: &str) -> bool {
    text.trim().eq_ignore_ascii_case(NO)
}

pub fn menu(text: &str, labels: &[&str]) -> OutboundMessage {
    OutboundMessage::choices(text, labels)
}

fn quarter_labels() -> Vec<&'static str> {
    Quarter::ALL.iter().map(|q| q.as_str()).collect()
}

pub fn quarter_prompt() -> OutboundMessage {
    OutboundMessage::choices("Selecciona un trimestre:", &quarter_labels())
}

pub fn invalid_quarter() -> OutboundMessage {
    OutboundMessage::choices(
        "Selecciona un trimestre válido (Q1, Q2, Q3 o Q4).",
        &quarter_labels(),
    )
}

pub fn leader_prompt(quarter: Quarter) -> OutboundMessage {
    OutboundMessage::text(format!(
        "Seleccionaste {}. Ahora escribe la matrícula del líder.",
        quarter
    ))
}

pub fn leader_not_found(leader_id: &str) -> OutboundMessage {
    OutboundMessage::text(format!(
        "La matrícula {} no se encuentra en la tabla de usuarios. Intenta de nuevo.",
        leader_id
    ))
}

pub fn generating(quarter: Quarter, leader_id: &str) -> OutboundMessage {
    OutboundMessage::text(format!(
        "¡Perfecto! Generando la presentación del {} para el líder {}...",
        quarter, leader_id
    ))
}

pub fn report_ready(quarter: Quarter, leader_id: &str, url: &str) -> OutboundMessage {
    OutboundMessage::Card(HeroCard {
        title: "¡Tu presentación está lista!".to_string(),
        subtitle: format!("Presentación del {} para el líder {}", quarter, leader_id),
        button_title: "Descargar presentación".to_string(),
        url: url.to_string(),
    })
}

pub fn retry_choices() -> OutboundMessage {
    OutboundMessage::choices("¿Qué deseas hacer?", &[RETRY, BACK_TO_START])
}

/// Description of the next meeting and its agenda.
pub fn agenda_summary(meeting: Option<&Meeting>) -> OutboundMessage {
    let Some(meeting) = meeting else {
        return OutboundMessage::text(NO_UPCOMING_MEETING);
    };
    let when = meeting
        .start_time()
        .map(|t| t.format("%d/%m/%Y %H:%M UTC").to_string())
        .unwrap_or_else(|| meeting.start.clone());
    let agenda = meeting.agenda();
    if agenda.is_empty() {
        OutboundMessage::text(format!(
            "La próxima reunión \"{}\" ({}) no tiene agenda registrada.",
            meeting.subject, when
        ))
    } else {
        OutboundMessage::text(format!(
            "Agenda de la próxima reunión \"{}\" ({}):\n{}",
            meeting.subject,
            when,
            format_agenda(&agenda)
        ))
    }
}

pub fn ask_modify() -> OutboundMessage {
    OutboundMessage::choices("¿Deseas modificar la agenda?", &[YES, NO])
}

pub fn ask_edit_mode() -> OutboundMessage {
    OutboundMessage::choices(
        "¿Quieres agregar puntos a la agenda actual o reemplazarla por completo?",
        &[ADD_POINTS, REPLACE_AGENDA],
    )
}

pub fn agenda_input_prompt() -> OutboundMessage {
    OutboundMessage::text(
        "Escribe los puntos de la agenda separados por comas o uno por línea \
         (máximo 10 puntos, de 1 a 20 palabras cada uno).",
    )
}

pub fn agenda_preview(points: &[String]) -> OutboundMessage {
    let body = if points.is_empty() {
        "(sin puntos)".to_string()
    } else {
        format_agenda(points)
    };
    OutboundMessage::text(format!("La agenda quedaría así:\n{}", body))
}

pub fn confirm_changes() -> OutboundMessage {
    OutboundMessage::choices("¿Confirmas los cambios?", &[YES, NO, CANCEL])
}

pub fn content_preview(title: &str, content: &str) -> OutboundMessage {
    let content = content.trim();
    let body = if content.is_empty() { "(vacío)" } else { content };
    OutboundMessage::text(format!("{}\n\n{}", title, body))
}

pub fn content_choices() -> OutboundMessage {
    OutboundMessage::choices("¿Qué deseas hacer?", &[EDIT_WITH_ASSISTANT, CONTINUE])
}

/// Message for a failed lookup: missing file and malformed file ask for an administrator,
/// anything else invites a retry.
pub fn lookup_error(file: &str, err: &ReferenceError) -> OutboundMessage {
    let text = match err {
        ReferenceError::Fetch(FileShareError::NotConfigured(_)) => {
            "El acceso a los archivos no está configurado. Por favor contacta al administrador."
                .to_string()
        }
        e if e.is_not_found() => format!(
            "No se encontró el archivo {}. Por favor contacta al administrador.",
            file
        ),
        e if e.is_malformed() => format!(
            "El archivo {} no tiene el formato esperado. Por favor contacta al administrador.",
            file
        ),
        _ => format!(
            "Ocurrió un error al acceder a {}. Por favor intenta de nuevo.",
            file
        ),
    };
    OutboundMessage::Text(text)
}
