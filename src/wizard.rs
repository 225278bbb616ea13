//! Three-step wizard state: upload → style → generate.
//!
//! [`WizardState`] is an immutable value; [`WizardState::reduce`] takes an
//! action and returns the next state. All session state lives in one value
//! owned by the caller, and every transition is a pure function.
//!
//! Generation is asynchronous and not cancellable. Each
//! [`WizardAction::BeginGeneration`] issues a fresh [`GenerationTicket`];
//! a finish or failure carrying any other ticket is stale and ignored, so a
//! slow earlier request can never overwrite a newer batch.

use crate::error::HeadshotError;
use crate::output::GeneratedArtifact;
use crate::pipeline::download::Selection;
use crate::pipeline::normalize::ProcessedImage;
use crate::pipeline::request::{build_request, GenerationRequest, Quantity};
use crate::styles::StyleTemplate;
use std::collections::{BTreeSet, HashSet};
use std::sync::Arc;
use tracing::debug;

/// Wizard steps, in order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Step {
    Upload = 1,
    Style = 2,
    Generate = 3,
}

impl Step {
    pub fn number(self) -> u8 {
        self as u8
    }

    pub fn title(self) -> &'static str {
        match self {
            Step::Upload => "Upload Photo",
            Step::Style => "Choose Style",
            Step::Generate => "Generate & Download",
        }
    }

    fn next(self) -> Option<Step> {
        match self {
            Step::Upload => Some(Step::Style),
            Step::Style => Some(Step::Generate),
            Step::Generate => None,
        }
    }

    fn previous(self) -> Option<Step> {
        match self {
            Step::Upload => None,
            Step::Style => Some(Step::Upload),
            Step::Generate => Some(Step::Style),
        }
    }
}

/// The uploaded photo, or its absence.
///
/// Replacing a `Present` image drops the last reference to the previous
/// one, which releases its preview.
#[derive(Debug, Clone, Default)]
pub enum ImageSlot {
    Present(Arc<ProcessedImage>),
    #[default]
    Absent,
}

impl ImageSlot {
    pub fn get(&self) -> Option<&Arc<ProcessedImage>> {
        match self {
            ImageSlot::Present(img) => Some(img),
            ImageSlot::Absent => None,
        }
    }

    pub fn is_present(&self) -> bool {
        matches!(self, ImageSlot::Present(_))
    }
}

/// Identifies one generation attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct GenerationTicket(u64);

/// Everything that can happen to the wizard.
#[derive(Debug, Clone)]
pub enum WizardAction {
    SetImage(ImageSlot),
    SelectStyle(&'static StyleTemplate),
    SetCustomPrompt(String),
    IncrementQuantity,
    DecrementQuantity,
    SetQuantity(i64),
    BeginGeneration,
    FinishGeneration {
        ticket: GenerationTicket,
        artifacts: Vec<GeneratedArtifact>,
    },
    FailGeneration {
        ticket: GenerationTicket,
    },
    ToggleSelection(String),
    ToggleSelectAll,
    Next,
    Previous,
    GoTo(Step),
}

/// Session state of the wizard.
#[derive(Debug, Clone)]
pub struct WizardState {
    current: Step,
    completed: BTreeSet<Step>,
    image: ImageSlot,
    style: Option<&'static StyleTemplate>,
    custom_prompt: String,
    quantity: Quantity,
    in_flight: Option<GenerationTicket>,
    last_ticket: u64,
    batch: Vec<GeneratedArtifact>,
    selection: BTreeSet<String>,
}

impl Default for WizardState {
    fn default() -> Self {
        Self {
            current: Step::Upload,
            completed: BTreeSet::new(),
            image: ImageSlot::Absent,
            style: None,
            custom_prompt: String::new(),
            quantity: Quantity::default(),
            in_flight: None,
            last_ticket: 0,
            batch: Vec::new(),
            selection: BTreeSet::new(),
        }
    }
}

impl WizardState {
    pub fn new() -> Self {
        Self::default()
    }

    // ── Accessors ────────────────────────────────────────────────────────

    pub fn current_step(&self) -> Step {
        self.current
    }

    pub fn is_completed(&self, step: Step) -> bool {
        self.completed.contains(&step)
    }

    pub fn completed_steps(&self) -> impl Iterator<Item = Step> + '_ {
        self.completed.iter().copied()
    }

    pub fn image(&self) -> &ImageSlot {
        &self.image
    }

    pub fn style(&self) -> Option<&'static StyleTemplate> {
        self.style
    }

    pub fn custom_prompt(&self) -> &str {
        &self.custom_prompt
    }

    pub fn quantity(&self) -> Quantity {
        self.quantity
    }

    pub fn is_generating(&self) -> bool {
        self.in_flight.is_some()
    }

    /// Ticket of the generation currently awaited, if any.
    pub fn in_flight(&self) -> Option<GenerationTicket> {
        self.in_flight
    }

    pub fn batch(&self) -> &[GeneratedArtifact] {
        &self.batch
    }

    pub fn selected_ids(&self) -> impl Iterator<Item = &str> + '_ {
        self.selection.iter().map(String::as_str)
    }

    pub fn is_selected(&self, id: &str) -> bool {
        self.selection.contains(id)
    }

    // ── Gating ───────────────────────────────────────────────────────────

    /// Whether the current step's requirement is met.
    pub fn can_go_next(&self) -> bool {
        match self.current {
            Step::Upload => self.image.is_present(),
            Step::Style => self.style.is_some(),
            Step::Generate => true,
        }
    }

    pub fn can_go_previous(&self) -> bool {
        self.current.previous().is_some()
    }

    /// A step is reachable when it is completed, current, or directly next.
    pub fn can_go_to(&self, step: Step) -> bool {
        self.completed.contains(&step)
            || step == self.current
            || Some(step) == self.current.next()
    }

    // ── Derived requests ─────────────────────────────────────────────────

    /// Build the request for the current inputs.
    ///
    /// # Errors
    /// [`HeadshotError::NotReady`] when no image or no style is set.
    pub fn generation_request(&self, output_size: &str) -> Result<GenerationRequest, HeadshotError> {
        let image = self
            .image
            .get()
            .ok_or(HeadshotError::NotReady { missing: "image" })?;
        let style = self.style.ok_or(HeadshotError::NotReady { missing: "style" })?;
        Ok(build_request(
            style,
            image,
            &self.custom_prompt,
            self.quantity.get() as i64,
            output_size,
        ))
    }

    /// The current selection as a download selection.
    pub fn download_selection(&self) -> Selection {
        Selection::Subset(self.selection.iter().cloned().collect::<HashSet<_>>())
    }

    // ── Reducer ──────────────────────────────────────────────────────────

    /// Apply `action` and return the resulting state.
    pub fn reduce(&self, action: WizardAction) -> WizardState {
        let mut next = self.clone();
        match action {
            WizardAction::SetImage(slot) => {
                if slot.is_present() {
                    next.completed.insert(Step::Upload);
                } else {
                    next.completed.remove(&Step::Upload);
                }
                next.image = slot;
            }
            WizardAction::SelectStyle(style) => {
                next.style = Some(style);
                next.completed.insert(Step::Style);
            }
            WizardAction::SetCustomPrompt(text) => next.custom_prompt = text,
            WizardAction::IncrementQuantity => next.quantity = self.quantity.increment(),
            WizardAction::DecrementQuantity => next.quantity = self.quantity.decrement(),
            WizardAction::SetQuantity(n) => next.quantity = Quantity::new(n),
            WizardAction::BeginGeneration => {
                next.last_ticket = self.last_ticket + 1;
                next.in_flight = Some(GenerationTicket(next.last_ticket));
                next.batch.clear();
                next.selection.clear();
            }
            WizardAction::FinishGeneration { ticket, artifacts } => {
                if self.in_flight != Some(ticket) {
                    debug!("Ignoring stale generation result {:?}", ticket);
                    return next;
                }
                next.in_flight = None;
                if !artifacts.is_empty() {
                    next.completed.insert(Step::Generate);
                }
                next.batch = artifacts;
            }
            WizardAction::FailGeneration { ticket } => {
                if self.in_flight != Some(ticket) {
                    debug!("Ignoring stale generation failure {:?}", ticket);
                    return next;
                }
                next.in_flight = None;
                next.batch.clear();
            }
            WizardAction::ToggleSelection(id) => {
                if self.batch.iter().any(|a| a.id == id) && !next.selection.remove(&id) {
                    next.selection.insert(id);
                }
            }
            WizardAction::ToggleSelectAll => {
                if !self.batch.is_empty() && self.selection.len() == self.batch.len() {
                    next.selection.clear();
                } else {
                    next.selection = self.batch.iter().map(|a| a.id.clone()).collect();
                }
            }
            WizardAction::Next => {
                if self.can_go_next() {
                    if let Some(step) = self.current.next() {
                        next.current = step;
                    }
                }
            }
            WizardAction::Previous => {
                if let Some(step) = self.current.previous() {
                    next.current = step;
                }
            }
            WizardAction::GoTo(step) => {
                if self.can_go_to(step) {
                    next.current = step;
                }
            }
        }
        next
    }
}
