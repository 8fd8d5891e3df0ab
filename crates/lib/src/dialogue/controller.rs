//! Dialogue controller: one inbound text in, the next record and the replies out.
//!
//! The controller keeps no per-conversation state of its own. Every turn receives the stored
//! record, performs whatever lookups the step needs through the injected services, and returns
//! a [`TurnResult`] that the caller persists and delivers.

use super::agenda;
use super::outbound::OutboundMessage;
use super::prompts;
use super::state::{AgendaEdit, ConversationState, FlowState, Quarter};
use crate::config::{DialogueSettings, MenuShape, ReferenceConfig};
use crate::fileshare::FileShare;
use crate::llm::TextRewriter;
use crate::reference::{LeaderTable, MeetingsDocument, ReferenceError};
use crate::report::{ReportRequest, ReportService};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use tokio::sync::Mutex;

/// Source of "now" for next-meeting selection.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Delivers a message while the turn is still running, ahead of the turn's own replies.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, message: OutboundMessage);
}

/// Holds notices until the turn ends.
#[derive(Default)]
struct Deferred(Mutex<Vec<OutboundMessage>>);

#[async_trait]
impl Notifier for Deferred {
    async fn notify(&self, message: OutboundMessage) {
        self.0.lock().await.push(message);
    }
}

/// Outcome of one turn: the record to store and the messages to send, in order.
#[derive(Debug, Clone, PartialEq)]
pub struct TurnResult {
    pub state: ConversationState,
    pub messages: Vec<OutboundMessage>,
}

impl TurnResult {
    pub fn new(state: ConversationState) -> Self {
        Self {
            state,
            messages: Vec::new(),
        }
    }

    pub fn with_message(mut self, message: OutboundMessage) -> Self {
        self.messages.push(message);
        self
    }

    pub fn with_messages(mut self, messages: impl IntoIterator<Item = OutboundMessage>) -> Self {
        self.messages.extend(messages);
        self
    }
}

pub struct DialogueController {
    settings: DialogueSettings,
    reference: ReferenceConfig,
    files: Arc<dyn FileShare>,
    reports: Arc<dyn ReportService>,
    rewriter: Option<Arc<dyn TextRewriter>>,
    clock: Arc<dyn Clock>,
}

impl DialogueController {
    pub fn new(
        settings: DialogueSettings,
        reference: ReferenceConfig,
        files: Arc<dyn FileShare>,
        reports: Arc<dyn ReportService>,
    ) -> Self {
        Self {
            settings,
            reference,
            files,
            reports,
            rewriter: None,
            clock: Arc::new(SystemClock),
        }
    }

    pub fn with_rewriter(mut self, rewriter: Arc<dyn TextRewriter>) -> Self {
        self.rewriter = Some(rewriter);
        self
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    fn editing_enabled(&self) -> bool {
        self.settings.assistant_editing && self.rewriter.is_some()
    }

    fn menu_labels(&self) -> Vec<&'static str> {
        let mut labels = vec![prompts::GENERATE];
        if self.settings.agenda_review {
            labels.push(prompts::VIEW_AGENDA);
        }
        if self.editing_enabled() {
            labels.push(prompts::REVIEW_CONTENT);
        }
        labels
    }

    /// Welcome shown when a user joins the conversation.
    pub fn greeting(&self) -> Vec<OutboundMessage> {
        match self.settings.menu {
            MenuShape::Menu => vec![prompts::menu(prompts::GREETING, &self.menu_labels())],
            MenuShape::Direct => vec![
                OutboundMessage::text(prompts::DIRECT_GREETING),
                prompts::quarter_prompt(),
            ],
        }
    }

    /// Fresh record plus the greeting.
    pub fn start(&self) -> TurnResult {
        TurnResult::new(ConversationState::default()).with_messages(self.greeting())
    }

    /// Handle one text message against the stored record. Progress notices come first in
    /// the returned messages.
    pub async fn handle_message(&self, state: ConversationState, text: &str) -> TurnResult {
        let deferred = Deferred::default();
        let mut result = self.handle_message_with(state, text, &deferred).await;
        let mut messages = deferred.0.into_inner();
        messages.append(&mut result.messages);
        result.messages = messages;
        result
    }

    /// Like [`handle_message`](Self::handle_message), but progress notices (the "generating"
    /// message before a report request) go to `notifier` as soon as they are produced.
    pub async fn handle_message_with(
        &self,
        state: ConversationState,
        text: &str,
        notifier: &dyn Notifier,
    ) -> TurnResult {
        let text = text.trim();
        log::debug!("dialogue: {:?} <- {:?}", state.flow_state, text);
        match state.flow_state {
            FlowState::Initial => self.on_initial(state, text, notifier).await,
            FlowState::SelectingQuarter => self.on_quarter(state, text, notifier).await,
            FlowState::SelectingLeaderId => self.on_leader_id(state, text, notifier).await,
            FlowState::AwaitingModificationChoice => self.on_modification_choice(state, text),
            FlowState::ModifyingAgenda => self.on_edit_mode(state, text),
            FlowState::AwaitingAgendaInput => self.on_agenda_input(state, text),
            FlowState::ConfirmingAgendaChanges => self.on_agenda_confirmation(state, text).await,
            FlowState::ReviewingSessionContent => self.on_content_review(state, text).await,
            FlowState::AwaitingContentInput => self.on_content_input(state, text).await,
            FlowState::AwaitingRetryChoice => self.on_retry_choice(state, text, notifier).await,
        }
    }

    async fn on_initial(
        &self,
        state: ConversationState,
        text: &str,
        notifier: &dyn Notifier,
    ) -> TurnResult {
        if prompts::is_choice(text, prompts::GENERATE) {
            return self.begin_generation().await;
        }
        if self.settings.agenda_review && prompts::is_choice(text, prompts::VIEW_AGENDA) {
            return self.show_agenda(state).await;
        }
        if self.editing_enabled() && prompts::is_choice(text, prompts::REVIEW_CONTENT) {
            return self.open_session_content(state).await;
        }
        match self.settings.menu {
            MenuShape::Direct => self.on_quarter(state, text, notifier).await,
            MenuShape::Menu => TurnResult::new(state)
                .with_message(prompts::menu(prompts::UNRECOGNIZED, &self.menu_labels())),
        }
    }

    async fn begin_generation(&self) -> TurnResult {
        let mut state = ConversationState::default();
        if !self.settings.agenda_review {
            return to_quarter_selection(state);
        }
        let file = &self.reference.meetings_file;
        match self.load_meetings().await {
            Ok(doc) => {
                let meeting = doc.next_meeting(self.clock.now());
                state.pending_agenda = Some(meeting.map(|m| m.agenda()).unwrap_or_default());
                TurnResult::new(state.at(FlowState::AwaitingModificationChoice))
                    .with_message(prompts::agenda_summary(meeting))
                    .with_message(prompts::ask_modify())
            }
            Err(e) => {
                log::warn!("dialogue: cannot load {}: {}", file, e);
                TurnResult::new(state).with_message(prompts::lookup_error(file, &e))
            }
        }
    }

    async fn show_agenda(&self, state: ConversationState) -> TurnResult {
        let file = &self.reference.meetings_file;
        let summary = match self.load_meetings().await {
            Ok(doc) => prompts::agenda_summary(doc.next_meeting(self.clock.now())),
            Err(e) => {
                log::warn!("dialogue: cannot load {}: {}", file, e);
                prompts::lookup_error(file, &e)
            }
        };
        TurnResult::new(state)
            .with_message(summary)
            .with_message(prompts::menu(prompts::ANYTHING_ELSE, &self.menu_labels()))
    }

    async fn on_quarter(
        &self,
        mut state: ConversationState,
        text: &str,
        notifier: &dyn Notifier,
    ) -> TurnResult {
        let Ok(quarter) = text.parse::<Quarter>() else {
            return TurnResult::new(state).with_message(prompts::invalid_quarter());
        };
        state.quarter = Some(quarter);
        if let Some(leader_id) = &self.settings.fixed_leader_id {
            state.leader_id = Some(leader_id.clone());
            return self.generate(state, None, notifier).await;
        }
        TurnResult::new(state.at(FlowState::SelectingLeaderId))
            .with_message(prompts::leader_prompt(quarter))
    }

    async fn on_leader_id(
        &self,
        mut state: ConversationState,
        text: &str,
        notifier: &dyn Notifier,
    ) -> TurnResult {
        if text.is_empty() {
            return TurnResult::new(state)
                .with_message(OutboundMessage::text(prompts::LEADER_PROMPT));
        }
        let file = &self.reference.leader_table_file;
        let table = match self.load_leader_table().await {
            Ok(table) => table,
            Err(e) => {
                log::warn!("dialogue: cannot load {}: {}", file, e);
                return TurnResult::new(state).with_message(prompts::lookup_error(file, &e));
            }
        };
        if !table.contains(text) {
            log::debug!("dialogue: unknown leader id {:?}", text);
            return TurnResult::new(state).with_message(prompts::leader_not_found(text));
        }
        state.leader_id = Some(text.to_string());
        self.generate(state, Some(&table), notifier).await
    }

    fn on_modification_choice(&self, mut state: ConversationState, text: &str) -> TurnResult {
        if prompts::is_yes(text) {
            if state.agenda().is_none() {
                // Nothing to append to.
                state.agenda_edit = Some(AgendaEdit::Replace);
                return TurnResult::new(state.at(FlowState::AwaitingAgendaInput))
                    .with_message(prompts::agenda_input_prompt());
            }
            return TurnResult::new(state.at(FlowState::ModifyingAgenda))
                .with_message(prompts::ask_edit_mode());
        }
        if prompts::is_no(text) {
            return to_quarter_selection(state);
        }
        TurnResult::new(state).with_message(prompts::ask_modify())
    }

    fn on_edit_mode(&self, mut state: ConversationState, text: &str) -> TurnResult {
        let edit = if prompts::is_choice(text, prompts::ADD_POINTS) {
            AgendaEdit::Append
        } else if prompts::is_choice(text, prompts::REPLACE_AGENDA) {
            AgendaEdit::Replace
        } else {
            return TurnResult::new(state).with_message(prompts::ask_edit_mode());
        };
        state.agenda_edit = Some(edit);
        TurnResult::new(state.at(FlowState::AwaitingAgendaInput))
            .with_message(prompts::agenda_input_prompt())
    }

    fn on_agenda_input(&self, mut state: ConversationState, text: &str) -> TurnResult {
        let points = match agenda::validate_points(text) {
            Ok(points) => points,
            Err(errors) => {
                return TurnResult::new(state)
                    .with_messages(errors.into_iter().map(OutboundMessage::Text));
            }
        };
        let preview = agenda::merge(
            state.pending_agenda.as_deref().unwrap_or_default(),
            &points,
            state.agenda_edit.unwrap_or(AgendaEdit::Append),
        );
        state.proposed_points = Some(points);
        TurnResult::new(state.at(FlowState::ConfirmingAgendaChanges))
            .with_message(prompts::agenda_preview(&preview))
            .with_message(prompts::confirm_changes())
    }

    async fn on_agenda_confirmation(&self, mut state: ConversationState, text: &str) -> TurnResult {
        if prompts::is_yes(text) {
            let points = state.proposed_points.take().unwrap_or_default();
            let edit = state.agenda_edit.take().unwrap_or(AgendaEdit::Append);
            let merged = agenda::merge(
                state.pending_agenda.as_deref().unwrap_or_default(),
                &points,
                edit,
            );
            let mut notes = vec![OutboundMessage::text(prompts::AGENDA_UPDATED)];
            if self.settings.write_back_agenda {
                if let Err(e) = self.write_back_agenda(&merged).await {
                    log::warn!(
                        "dialogue: cannot write agenda to {}: {}",
                        self.reference.meetings_file,
                        e
                    );
                    notes.push(OutboundMessage::text(prompts::WRITE_BACK_FAILED));
                }
            }
            state.pending_agenda = Some(merged);
            let next = to_quarter_selection(state);
            return TurnResult::new(next.state)
                .with_messages(notes)
                .with_messages(next.messages);
        }
        if prompts::is_no(text) {
            state.proposed_points = None;
            return TurnResult::new(state.at(FlowState::AwaitingAgendaInput))
                .with_message(prompts::agenda_input_prompt());
        }
        if prompts::is_choice(text, prompts::CANCEL) {
            return TurnResult::new(ConversationState::default())
                .with_message(OutboundMessage::text(prompts::AGENDA_DISCARDED))
                .with_messages(self.greeting());
        }
        TurnResult::new(state).with_message(prompts::confirm_changes())
    }

    async fn open_session_content(&self, mut state: ConversationState) -> TurnResult {
        let file = &self.reference.session_content_file;
        match self.files.read_text(file).await {
            Ok(content) => {
                let content = content.trim().to_string();
                let preview = prompts::content_preview("Contenido actual de la sesión:", &content);
                state.session_content = Some(content);
                TurnResult::new(state.at(FlowState::ReviewingSessionContent))
                    .with_message(preview)
                    .with_message(prompts::content_choices())
            }
            Err(e) => {
                log::warn!("dialogue: cannot read {}: {}", file, e);
                let e = ReferenceError::from(e);
                TurnResult::new(state).with_message(prompts::lookup_error(file, &e))
            }
        }
    }

    async fn on_content_review(&self, state: ConversationState, text: &str) -> TurnResult {
        if prompts::is_choice(text, prompts::EDIT_WITH_ASSISTANT) {
            return TurnResult::new(state.at(FlowState::AwaitingContentInput))
                .with_message(OutboundMessage::text(prompts::CONTENT_INSTRUCTIONS_PROMPT));
        }
        if !prompts::is_choice(text, prompts::CONTINUE) {
            return TurnResult::new(state).with_message(prompts::content_choices());
        }
        let file = &self.reference.session_content_file;
        let content = state.session_content.clone().unwrap_or_default();
        if let Err(e) = self.files.write(file, content.as_bytes()).await {
            log::warn!("dialogue: cannot write {}: {}", file, e);
            let e = ReferenceError::from(e);
            return TurnResult::new(state).with_message(prompts::lookup_error(file, &e));
        }
        let mut state = state;
        state.session_content = None;
        let next = to_quarter_selection(state);
        TurnResult::new(next.state)
            .with_message(OutboundMessage::text(prompts::CONTENT_SAVED))
            .with_messages(next.messages)
    }

    async fn on_content_input(&self, mut state: ConversationState, text: &str) -> TurnResult {
        if text.is_empty() {
            return TurnResult::new(state)
                .with_message(OutboundMessage::text(agenda::EMPTY_INPUT));
        }
        let Some(rewriter) = self.rewriter.as_ref() else {
            return TurnResult::new(state.at(FlowState::ReviewingSessionContent))
                .with_message(OutboundMessage::text(prompts::REWRITE_UNAVAILABLE))
                .with_message(prompts::content_choices());
        };
        let current = state.session_content.clone().unwrap_or_default();
        match rewriter.rewrite(&current, text).await {
            Ok(revised) => {
                let preview = prompts::content_preview("Contenido revisado:", &revised);
                state.session_content = Some(revised);
                TurnResult::new(state.at(FlowState::ReviewingSessionContent))
                    .with_message(preview)
                    .with_message(prompts::content_choices())
            }
            Err(e) => {
                log::warn!("dialogue: rewrite failed: {}", e);
                TurnResult::new(state)
                    .with_message(OutboundMessage::text(prompts::REWRITE_FAILED))
            }
        }
    }

    async fn on_retry_choice(
        &self,
        state: ConversationState,
        text: &str,
        notifier: &dyn Notifier,
    ) -> TurnResult {
        if prompts::is_choice(text, prompts::RETRY) {
            return self.generate(state, None, notifier).await;
        }
        if prompts::is_choice(text, prompts::BACK_TO_START) {
            return self.start();
        }
        TurnResult::new(state).with_message(prompts::retry_choices())
    }

    /// Request the report. `table` is the leader table when the caller already loaded it.
    /// The generating notice goes out through `notifier` before the report service is called.
    async fn generate(
        &self,
        state: ConversationState,
        table: Option<&LeaderTable>,
        notifier: &dyn Notifier,
    ) -> TurnResult {
        let (Some(quarter), Some(leader_id)) = (state.quarter, state.leader_id.clone()) else {
            log::warn!("dialogue: generation requested without quarter or leader; starting over");
            return self.start();
        };
        let new_members = match table {
            Some(table) => table.new_members(&leader_id),
            None => match self.load_leader_table().await {
                Ok(table) => table.new_members(&leader_id),
                Err(e) => {
                    log::warn!(
                        "dialogue: cannot load {} for new members: {}",
                        self.reference.leader_table_file,
                        e
                    );
                    Vec::new()
                }
            },
        };
        let request = ReportRequest {
            q: quarter.to_string(),
            matricula_lider: leader_id.clone(),
            agenda: state
                .agenda()
                .map(<[String]>::to_vec)
                .unwrap_or_else(agenda::placeholder_agenda),
            nuevos_miembros: new_members,
        };
        notifier.notify(prompts::generating(quarter, &leader_id)).await;
        match self.reports.generate(&request).await {
            Ok(url) => {
                log::info!("dialogue: report ready for {} {}", quarter, leader_id);
                TurnResult::new(ConversationState::default())
                    .with_message(prompts::report_ready(quarter, &leader_id, &url))
            }
            Err(e) => {
                log::warn!("dialogue: report generation failed: {}", e);
                TurnResult::new(state.at(FlowState::AwaitingRetryChoice))
                    .with_message(OutboundMessage::text(prompts::REPORT_FAILED))
                    .with_message(prompts::retry_choices())
            }
        }
    }

    async fn load_leader_table(&self) -> Result<LeaderTable, ReferenceError> {
        let bytes = self.files.read(&self.reference.leader_table_file).await?;
        LeaderTable::from_workbook(bytes, &self.reference)
    }

    async fn load_meetings(&self) -> Result<MeetingsDocument, ReferenceError> {
        let bytes = self.files.read(&self.reference.meetings_file).await?;
        MeetingsDocument::from_slice(&bytes)
    }

    /// Replace the next meeting's agenda in the meetings file. No upcoming meeting: nothing written.
    async fn write_back_agenda(&self, points: &[String]) -> Result<(), ReferenceError> {
        let mut doc = self.load_meetings().await?;
        let Some(index) = doc.next_meeting_index(self.clock.now()) else {
            log::debug!("dialogue: no upcoming meeting to write the agenda to");
            return Ok(());
        };
        doc.meetings[index].body.agenda = points.to_vec();
        let bytes = doc.to_vec_pretty()?;
        self.files.write(&self.reference.meetings_file, &bytes).await?;
        Ok(())
    }
}

fn to_quarter_selection(state: ConversationState) -> TurnResult {
    TurnResult::new(state.at(FlowState::SelectingQuarter)).with_message(prompts::quarter_prompt())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fileshare::FileShareError;
    use crate::llm::RewriteError;
    use crate::report::ReportError;
    use async_trait::async_trait;
    use chrono::TimeZone;
    use std::collections::HashMap;
    use std::sync::Mutex;

    #[derive(Default)]
    struct FakeShare {
        files: Mutex<HashMap<String, Vec<u8>>>,
        fail_reads: bool,
    }

    impl FakeShare {
        fn with_file(self, name: &str, bytes: &[u8]) -> Self {
            self.files
                .lock()
                .unwrap()
                .insert(name.to_string(), bytes.to_vec());
            self
        }

        fn contents(&self, name: &str) -> Option<String> {
            self.files
                .lock()
                .unwrap()
                .get(name)
                .map(|b| String::from_utf8_lossy(b).into_owned())
        }
    }

    #[async_trait]
    impl FileShare for FakeShare {
        async fn read(&self, name: &str) -> Result<Vec<u8>, FileShareError> {
            if self.fail_reads {
                return Err(FileShareError::Api("503 unavailable".to_string()));
            }
            self.files
                .lock()
                .unwrap()
                .get(name)
                .cloned()
                .ok_or_else(|| FileShareError::NotFound(name.to_string()))
        }

        async fn write(&self, name: &str, bytes: &[u8]) -> Result<(), FileShareError> {
            self.files
                .lock()
                .unwrap()
                .insert(name.to_string(), bytes.to_vec());
            Ok(())
        }
    }

    #[derive(Default)]
    struct FakeReports {
        requests: Mutex<Vec<ReportRequest>>,
        fail: Mutex<bool>,
    }

    #[async_trait]
    impl ReportService for FakeReports {
        async fn generate(&self, request: &ReportRequest) -> Result<String, ReportError> {
            self.requests.lock().unwrap().push(request.clone());
            if *self.fail.lock().unwrap() {
                return Err(ReportError::Api("500 Internal Server Error".to_string()));
            }
            Ok("https://reportes.example/q.pptx".to_string())
        }
    }

    struct UpperRewriter;

    #[async_trait]
    impl TextRewriter for UpperRewriter {
        async fn rewrite(&self, content: &str, instructions: &str) -> Result<String, RewriteError> {
            if instructions == "falla" {
                return Err(RewriteError::EmptyCompletion);
            }
            Ok(content.to_uppercase())
        }
    }

    struct FixedClock(DateTime<Utc>);

    impl Clock for FixedClock {
        fn now(&self) -> DateTime<Utc> {
            self.0
        }
    }

    const LEADERS: &str = "Tabla_de_Usuarios_Actualizada.xlsx";
    const MEETINGS: &str = "reuniones.json";
    const CONTENT: &str = "contenido_sesion.txt";

    /// Leader workbook as the share serves it: numeric and text ids, mixed flag cells.
    fn leaders_xlsx() -> Vec<u8> {
        let mut workbook = rust_xlsxwriter::Workbook::new();
        let sheet = workbook.add_worksheet();
        sheet.write_string(0, 0, "Matricula Lider").unwrap();
        sheet.write_string(0, 1, "Nombre").unwrap();
        sheet.write_string(0, 2, "Nuevo Miembro").unwrap();
        sheet.write_number(1, 0, 4021.0).unwrap();
        sheet.write_string(1, 1, "Ana").unwrap();
        sheet.write_string(1, 2, "Sí").unwrap();
        sheet.write_number(2, 0, 4021.0).unwrap();
        sheet.write_string(2, 1, "Luis").unwrap();
        sheet.write_string(2, 2, "No").unwrap();
        sheet.write_string(3, 0, "7788").unwrap();
        sheet.write_string(3, 1, "Marta").unwrap();
        sheet.write_boolean(3, 2, true).unwrap();
        workbook.save_to_buffer().unwrap()
    }

    struct Harness {
        controller: DialogueController,
        share: Arc<FakeShare>,
        reports: Arc<FakeReports>,
    }

    fn meetings_json() -> &'static str {
        r#"{
            "meetings": [
                { "subject": "Pasada", "start": "2024-01-10T15:00:00Z", "body": { "agenda": ["Viejo"] } },
                { "subject": "Sesión de marzo", "start": "2024-03-05T15:00:00Z", "body": { "agenda": ["Bienvenida", "Resultados"] } },
                { "subject": "Sesión de abril", "start": "2024-04-05T15:00:00Z", "body": { "agenda": [] } }
            ]
        }"#
    }

    fn settings() -> DialogueSettings {
        DialogueSettings::default()
    }

    fn harness_with(settings: DialogueSettings, share: FakeShare) -> Harness {
        let share = Arc::new(share);
        let reports = Arc::new(FakeReports::default());
        let controller = DialogueController::new(
            settings,
            ReferenceConfig::default(),
            share.clone(),
            reports.clone(),
        )
        .with_rewriter(Arc::new(UpperRewriter))
        .with_clock(Arc::new(FixedClock(
            Utc.with_ymd_and_hms(2024, 2, 1, 12, 0, 0).unwrap(),
        )));
        Harness {
            controller,
            share,
            reports,
        }
    }

    fn harness(settings: DialogueSettings) -> Harness {
        harness_with(settings, FakeShare::default().with_file(MEETINGS, meetings_json().as_bytes()))
    }

    /// Meetings document plus the leader workbook.
    fn harness_with_leaders(settings: DialogueSettings) -> Harness {
        harness_with(
            settings,
            FakeShare::default()
                .with_file(MEETINGS, meetings_json().as_bytes())
                .with_file(LEADERS, &leaders_xlsx()),
        )
    }

    impl Harness {
        async fn say(&self, state: ConversationState, text: &str) -> TurnResult {
            self.controller.handle_message(state, text).await
        }

        fn last_request(&self) -> ReportRequest {
            self.reports
                .requests
                .lock()
                .unwrap()
                .last()
                .cloned()
                .expect("a report request")
        }
    }

    fn in_state(flow: FlowState) -> ConversationState {
        ConversationState::default().at(flow)
    }

    #[tokio::test]
    async fn known_leader_generates_with_new_members() {
        let h = harness_with_leaders(settings());
        let mut state = in_state(FlowState::SelectingLeaderId);
        state.quarter = Some(Quarter::Q2);
        let turn = h.say(state, " 4021 ").await;
        assert_eq!(turn.state, ConversationState::default());
        assert_eq!(
            turn.messages,
            vec![
                prompts::generating(Quarter::Q2, "4021"),
                prompts::report_ready(Quarter::Q2, "4021", "https://reportes.example/q.pptx"),
            ]
        );
        assert_eq!(
            h.last_request(),
            ReportRequest {
                q: "Q2".to_string(),
                matricula_lider: "4021".to_string(),
                agenda: agenda::placeholder_agenda(),
                nuevos_miembros: vec!["Ana".to_string()],
            }
        );
    }

    #[tokio::test]
    async fn unknown_leader_does_not_advance() {
        let h = harness_with_leaders(settings());
        let mut state = in_state(FlowState::SelectingLeaderId);
        state.quarter = Some(Quarter::Q2);
        for unknown in ["9999", "4021.0", "Ana"] {
            let turn = h.say(state.clone(), unknown).await;
            assert_eq!(turn.state, state);
            assert_eq!(turn.messages, vec![prompts::leader_not_found(unknown)]);
        }
        assert!(h.reports.requests.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn text_leader_id_from_workbook_is_accepted() {
        let h = harness_with_leaders(settings());
        let mut state = in_state(FlowState::SelectingLeaderId);
        state.quarter = Some(Quarter::Q4);
        let turn = h.say(state, "7788").await;
        assert_eq!(turn.state, ConversationState::default());
        assert_eq!(h.last_request().nuevos_miembros, vec!["Marta".to_string()]);
    }

    #[tokio::test]
    async fn generating_notice_is_delivered_before_the_report_request() {
        struct Seen {
            reports: Arc<FakeReports>,
            requests_at_notice: Mutex<Vec<usize>>,
        }

        #[async_trait]
        impl Notifier for Seen {
            async fn notify(&self, message: OutboundMessage) {
                assert_eq!(message, prompts::generating(Quarter::Q1, "4021"));
                let sent = self.reports.requests.lock().unwrap().len();
                self.requests_at_notice.lock().unwrap().push(sent);
            }
        }

        let h = harness(DialogueSettings {
            fixed_leader_id: Some("4021".to_string()),
            ..settings()
        });
        let seen = Seen {
            reports: h.reports.clone(),
            requests_at_notice: Mutex::new(Vec::new()),
        };
        let turn = h
            .controller
            .handle_message_with(in_state(FlowState::SelectingQuarter), "Q1", &seen)
            .await;
        assert_eq!(*seen.requests_at_notice.lock().unwrap(), vec![0]);
        assert_eq!(h.reports.requests.lock().unwrap().len(), 1);
        // The notice went out through the notifier, not with the turn's replies.
        assert_eq!(
            turn.messages,
            vec![prompts::report_ready(Quarter::Q1, "4021", "https://reportes.example/q.pptx")]
        );
    }

    #[tokio::test]
    async fn greeting_lists_enabled_menu_entries() {
        let h = harness(DialogueSettings {
            agenda_review: true,
            assistant_editing: true,
            ..settings()
        });
        let greeting = h.controller.greeting();
        assert_eq!(
            greeting,
            vec![OutboundMessage::choices(
                prompts::GREETING,
                &[prompts::GENERATE, prompts::VIEW_AGENDA, prompts::REVIEW_CONTENT]
            )]
        );

        let plain = harness(settings());
        assert_eq!(
            plain.controller.greeting(),
            vec![OutboundMessage::choices(prompts::GREETING, &[prompts::GENERATE])]
        );
    }

    #[tokio::test]
    async fn direct_greeting_asks_for_quarter() {
        let h = harness(DialogueSettings {
            menu: MenuShape::Direct,
            ..settings()
        });
        let greeting = h.controller.greeting();
        assert_eq!(greeting.len(), 2);
        assert_eq!(greeting[1], prompts::quarter_prompt());

        let turn = h.say(ConversationState::default(), "q3").await;
        assert_eq!(turn.state.flow_state, FlowState::SelectingLeaderId);
        assert_eq!(turn.state.quarter, Some(Quarter::Q3));
    }

    #[tokio::test]
    async fn generate_without_agenda_review_asks_for_quarter() {
        let h = harness(settings());
        let turn = h.say(ConversationState::default(), "generar la presentación").await;
        assert_eq!(turn.state, in_state(FlowState::SelectingQuarter));
        assert_eq!(turn.messages, vec![prompts::quarter_prompt()]);
    }

    #[tokio::test]
    async fn unknown_menu_input_reprompts() {
        let h = harness(settings());
        let turn = h.say(ConversationState::default(), "hola").await;
        assert_eq!(turn.state, ConversationState::default());
        assert_eq!(
            turn.messages,
            vec![OutboundMessage::choices(prompts::UNRECOGNIZED, &[prompts::GENERATE])]
        );
    }

    #[tokio::test]
    async fn non_quarter_tokens_leave_state_unchanged() {
        let h = harness(settings());
        for token in ["Q5", "", "trimestre 1", "Cancelar", "Volver al inicio"] {
            let state = in_state(FlowState::SelectingQuarter);
            let turn = h.say(state.clone(), token).await;
            assert_eq!(turn.state, state, "token {:?}", token);
            assert_eq!(turn.messages, vec![prompts::invalid_quarter()]);
        }
    }

    #[tokio::test]
    async fn lowercase_quarter_is_accepted() {
        let h = harness(settings());
        let lower = h.say(in_state(FlowState::SelectingQuarter), "q2").await;
        let upper = h.say(in_state(FlowState::SelectingQuarter), "Q2").await;
        assert_eq!(lower, upper);
        assert_eq!(lower.state.flow_state, FlowState::SelectingLeaderId);
        assert_eq!(lower.state.quarter, Some(Quarter::Q2));
    }

    #[tokio::test]
    async fn fixed_leader_skips_leader_selection() {
        let h = harness(DialogueSettings {
            fixed_leader_id: Some("4021".to_string()),
            ..settings()
        });
        let turn = h.say(in_state(FlowState::SelectingQuarter), "Q1").await;
        assert_eq!(turn.state, ConversationState::default());
        let request = h.last_request();
        assert_eq!(request.q, "Q1");
        assert_eq!(request.matricula_lider, "4021");
        // Table missing from the share: no new members, generation still happens.
        assert!(request.nuevos_miembros.is_empty());
        assert_eq!(request.agenda, agenda::placeholder_agenda());
        assert_eq!(
            turn.messages[1],
            prompts::report_ready(Quarter::Q1, "4021", "https://reportes.example/q.pptx")
        );
    }

    #[tokio::test]
    async fn missing_leader_table_reports_contact_administrator() {
        let h = harness(settings());
        let mut state = in_state(FlowState::SelectingLeaderId);
        state.quarter = Some(Quarter::Q2);
        let turn = h.say(state.clone(), "4021").await;
        assert_eq!(turn.state, state);
        assert_eq!(
            turn.messages,
            vec![OutboundMessage::text(format!(
                "No se encontró el archivo {}. Por favor contacta al administrador.",
                LEADERS
            ))]
        );
    }

    #[tokio::test]
    async fn malformed_leader_table_is_reported() {
        let h = harness_with(
            settings(),
            FakeShare::default().with_file(LEADERS, b"not a workbook"),
        );
        let mut state = in_state(FlowState::SelectingLeaderId);
        state.quarter = Some(Quarter::Q2);
        let turn = h.say(state.clone(), "4021").await;
        assert_eq!(turn.state, state);
        assert!(turn.messages[0].plain_text().contains("formato esperado"));
    }

    #[tokio::test]
    async fn transient_share_failure_invites_retry() {
        let share = FakeShare {
            fail_reads: true,
            ..FakeShare::default()
        };
        let h = harness_with(
            DialogueSettings {
                agenda_review: true,
                ..settings()
            },
            share,
        );
        let turn = h.say(ConversationState::default(), prompts::GENERATE).await;
        assert_eq!(turn.state, ConversationState::default());
        assert_eq!(
            turn.messages,
            vec![OutboundMessage::text(format!(
                "Ocurrió un error al acceder a {}. Por favor intenta de nuevo.",
                MEETINGS
            ))]
        );
    }

    #[tokio::test]
    async fn agenda_review_shows_next_meeting() {
        let h = harness(DialogueSettings {
            agenda_review: true,
            ..settings()
        });
        let turn = h.say(ConversationState::default(), prompts::GENERATE).await;
        assert_eq!(turn.state.flow_state, FlowState::AwaitingModificationChoice);
        assert_eq!(
            turn.state.pending_agenda,
            Some(vec!["Bienvenida".to_string(), "Resultados".to_string()])
        );
        assert!(turn.messages[0].plain_text().contains("Sesión de marzo"));
        assert!(turn.messages[0].plain_text().contains("1. Bienvenida"));
        assert_eq!(turn.messages[1], prompts::ask_modify());

        // "No" keeps the fetched agenda and moves to quarter selection.
        let turn = h.say(turn.state, "no").await;
        assert_eq!(turn.state.flow_state, FlowState::SelectingQuarter);
        assert_eq!(
            turn.state.agenda(),
            Some(&["Bienvenida".to_string(), "Resultados".to_string()][..])
        );
    }

    #[tokio::test]
    async fn view_agenda_stays_in_menu() {
        let h = harness(DialogueSettings {
            agenda_review: true,
            ..settings()
        });
        let turn = h.say(ConversationState::default(), "consultar agenda").await;
        assert_eq!(turn.state, ConversationState::default());
        assert_eq!(turn.messages.len(), 2);
        assert!(turn.messages[0].plain_text().contains("Resultados"));
    }

    #[tokio::test]
    async fn view_agenda_is_hidden_when_disabled() {
        let h = harness(settings());
        let turn = h.say(ConversationState::default(), "Consultar agenda").await;
        assert_eq!(turn.state, ConversationState::default());
        assert_eq!(
            turn.messages,
            vec![OutboundMessage::choices(prompts::UNRECOGNIZED, &[prompts::GENERATE])]
        );
    }

    #[tokio::test]
    async fn appending_points_updates_pending_agenda() {
        let h = harness_with_leaders(DialogueSettings {
            agenda_review: true,
            ..settings()
        });
        let turn = h.say(ConversationState::default(), prompts::GENERATE).await;
        let turn = h.say(turn.state, "Sí").await;
        assert_eq!(turn.state.flow_state, FlowState::ModifyingAgenda);
        let turn = h.say(turn.state, "agregar puntos").await;
        assert_eq!(turn.state.flow_state, FlowState::AwaitingAgendaInput);
        assert_eq!(turn.state.agenda_edit, Some(AgendaEdit::Append));

        let turn = h.say(turn.state, "cierre, preguntas").await;
        assert_eq!(turn.state.flow_state, FlowState::ConfirmingAgendaChanges);
        assert!(turn.messages[0].plain_text().contains("4. Preguntas"));

        let turn = h.say(turn.state, "si").await;
        assert_eq!(turn.state.flow_state, FlowState::SelectingQuarter);
        assert_eq!(
            turn.state.pending_agenda,
            Some(vec![
                "Bienvenida".to_string(),
                "Resultados".to_string(),
                "Cierre".to_string(),
                "Preguntas".to_string(),
            ])
        );
        assert!(turn.state.proposed_points.is_none());
        assert_eq!(turn.messages[0], OutboundMessage::text(prompts::AGENDA_UPDATED));

        let turn = h.say(turn.state, "Q4").await;
        let state = turn.state;
        assert_eq!(state.flow_state, FlowState::SelectingLeaderId);
        let _ = h.say(state, "4021").await;
        let request = h.last_request();
        assert_eq!(request.agenda.len(), 4);
        assert_eq!(request.nuevos_miembros, vec!["Ana".to_string()]);
    }

    #[tokio::test]
    async fn empty_agenda_skips_edit_mode_and_replaces() {
        let h = harness(DialogueSettings {
            agenda_review: true,
            ..settings()
        });
        let mut state = in_state(FlowState::AwaitingModificationChoice);
        state.pending_agenda = Some(Vec::new());
        let turn = h.say(state, "Sí").await;
        assert_eq!(turn.state.flow_state, FlowState::AwaitingAgendaInput);
        assert_eq!(turn.state.agenda_edit, Some(AgendaEdit::Replace));
    }

    #[tokio::test]
    async fn empty_agenda_input_is_rejected() {
        let h = harness(settings());
        let state = in_state(FlowState::AwaitingAgendaInput);
        let turn = h.say(state.clone(), "   ").await;
        assert_eq!(turn.state, state);
        assert_eq!(
            turn.messages,
            vec![OutboundMessage::text("La entrada no puede estar vacía.")]
        );
    }

    #[tokio::test]
    async fn eleven_points_are_rejected_once() {
        let h = harness(settings());
        let state = in_state(FlowState::AwaitingAgendaInput);
        let input = (1..=11).map(|i| format!("tema {}", i)).collect::<Vec<_>>().join(", ");
        let turn = h.say(state.clone(), &input).await;
        assert_eq!(turn.state, state);
        assert_eq!(turn.messages.len(), 1);
        assert!(turn.messages[0].plain_text().contains("10"));
    }

    #[tokio::test]
    async fn rejecting_proposal_asks_again_and_cancel_resets() {
        let h = harness(settings());
        let mut state = in_state(FlowState::ConfirmingAgendaChanges);
        state.proposed_points = Some(vec!["Uno".to_string()]);
        state.agenda_edit = Some(AgendaEdit::Replace);

        let turn = h.say(state.clone(), "No").await;
        assert_eq!(turn.state.flow_state, FlowState::AwaitingAgendaInput);
        assert!(turn.state.proposed_points.is_none());

        let turn = h.say(state.clone(), "quizá").await;
        assert_eq!(turn.state, state);
        assert_eq!(turn.messages, vec![prompts::confirm_changes()]);

        let turn = h.say(state, "cancelar").await;
        assert_eq!(turn.state, ConversationState::default());
        assert_eq!(turn.messages[0], OutboundMessage::text(prompts::AGENDA_DISCARDED));
    }

    #[tokio::test]
    async fn confirmed_agenda_is_written_back() {
        let h = harness(DialogueSettings {
            agenda_review: true,
            write_back_agenda: true,
            ..settings()
        });
        let mut state = in_state(FlowState::ConfirmingAgendaChanges);
        state.pending_agenda = Some(vec!["Bienvenida".to_string()]);
        state.proposed_points = Some(vec!["Nuevo tema".to_string()]);
        state.agenda_edit = Some(AgendaEdit::Replace);
        let turn = h.say(state, "Sí").await;
        assert_eq!(turn.state.pending_agenda, Some(vec!["Nuevo tema".to_string()]));

        let saved = h.share.contents(MEETINGS).unwrap();
        let doc = MeetingsDocument::from_slice(saved.as_bytes()).unwrap();
        assert_eq!(doc.meetings[1].body.agenda, vec!["Nuevo tema".to_string()]);
        assert_eq!(doc.meetings[0].body.agenda, vec!["Viejo".to_string()]);
    }

    #[tokio::test]
    async fn failed_generation_offers_retry() {
        let h = harness(DialogueSettings {
            fixed_leader_id: Some("4021".to_string()),
            ..settings()
        });
        *h.reports.fail.lock().unwrap() = true;
        let turn = h.say(in_state(FlowState::SelectingQuarter), "Q3").await;
        assert_eq!(turn.state.flow_state, FlowState::AwaitingRetryChoice);
        assert_eq!(turn.state.quarter, Some(Quarter::Q3));
        assert_eq!(turn.messages.last(), Some(&prompts::retry_choices()));

        let again = h.say(turn.state.clone(), "reintentar").await;
        assert_eq!(again.state.flow_state, FlowState::AwaitingRetryChoice);
        assert_eq!(h.reports.requests.lock().unwrap().len(), 2);

        *h.reports.fail.lock().unwrap() = false;
        let ok = h.say(turn.state.clone(), "Reintentar").await;
        assert_eq!(ok.state, ConversationState::default());

        let back = h.say(turn.state, "volver al inicio").await;
        assert_eq!(back.state, ConversationState::default());
        assert_eq!(back.messages, h.controller.greeting());
    }

    #[tokio::test]
    async fn generating_again_after_success_matches_fresh_conversation() {
        let h = harness(DialogueSettings {
            fixed_leader_id: Some("4021".to_string()),
            ..settings()
        });
        let done = h.say(in_state(FlowState::SelectingQuarter), "Q1").await;
        let after = h.say(done.state, prompts::GENERATE).await;
        let fresh = h.say(ConversationState::default(), prompts::GENERATE).await;
        assert_eq!(after, fresh);
        assert_eq!(after.state.flow_state, FlowState::SelectingQuarter);
    }

    #[tokio::test]
    async fn session_content_edit_and_save() {
        let h = harness_with(
            DialogueSettings {
                assistant_editing: true,
                ..settings()
            },
            FakeShare::default().with_file(CONTENT, "  resumen de la sesión \n".as_bytes()),
        );
        let turn = h.say(ConversationState::default(), "Revisar contenido de la sesión").await;
        assert_eq!(turn.state.flow_state, FlowState::ReviewingSessionContent);
        assert_eq!(turn.state.session_content.as_deref(), Some("resumen de la sesión"));

        let turn = h.say(turn.state, "Editar con asistente").await;
        assert_eq!(turn.state.flow_state, FlowState::AwaitingContentInput);

        let empty = h.say(turn.state.clone(), "").await;
        assert_eq!(empty.state, turn.state);
        assert_eq!(empty.messages, vec![OutboundMessage::text(agenda::EMPTY_INPUT)]);

        let failed = h.say(turn.state.clone(), "falla").await;
        assert_eq!(failed.state, turn.state);
        assert_eq!(failed.messages, vec![OutboundMessage::text(prompts::REWRITE_FAILED)]);

        let turn = h.say(turn.state, "en mayúsculas").await;
        assert_eq!(turn.state.flow_state, FlowState::ReviewingSessionContent);
        assert_eq!(turn.state.session_content.as_deref(), Some("RESUMEN DE LA SESIÓN"));

        let turn = h.say(turn.state, "continuar").await;
        assert_eq!(turn.state.flow_state, FlowState::SelectingQuarter);
        assert!(turn.state.session_content.is_none());
        assert_eq!(h.share.contents(CONTENT).as_deref(), Some("RESUMEN DE LA SESIÓN"));
    }

    #[tokio::test]
    async fn session_review_needs_a_rewriter() {
        let share = Arc::new(FakeShare::default().with_file(CONTENT, b"texto"));
        let controller = DialogueController::new(
            DialogueSettings {
                assistant_editing: true,
                ..settings()
            },
            ReferenceConfig::default(),
            share,
            Arc::new(FakeReports::default()),
        );
        assert_eq!(
            controller.greeting(),
            vec![OutboundMessage::choices(prompts::GREETING, &[prompts::GENERATE])]
        );
        let turn = controller
            .handle_message(ConversationState::default(), prompts::REVIEW_CONTENT)
            .await;
        assert_eq!(turn.state, ConversationState::default());
    }

    #[tokio::test]
    async fn retry_without_collected_fields_starts_over() {
        let h = harness(settings());
        let turn = h.say(in_state(FlowState::AwaitingRetryChoice), "Reintentar").await;
        assert_eq!(turn, h.controller.start());
        assert!(h.reports.requests.lock().unwrap().is_empty());
    }
}
