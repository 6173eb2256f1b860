use std::cell::RefCell;
use std::collections::HashSet;
use std::future::Future;
use std::pin::Pin;
use std::rc::Rc;
use std::task::{Context, Poll, Waker};

use multicaret_config::{Config, OrchestratorSettings};

use crate::carets::{Caret, CaretId, MultiCaretData};
use crate::editing::Document;
use crate::editing::anchors::AnchorBatch;
use crate::editing::history::CommandKind;
use crate::editing::operation::Operation;
use crate::error::{EditorError, Result};
use crate::transient::sandbox::{Sandbox, SandboxState, TransientEditor};

/// Outcome of a successful multi-caret run
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct RunSummary {
    /// Rounds executed
    pub rounds: usize,
    /// Rounds that changed the document text
    pub edits: usize,
}

/// How one round's sandbox operations land on the real document
///
/// The operations all start from the same text. They are folded in sandbox order: the running
/// prefix is transformed against each operation and composed with its transformed form, giving
/// the composite. Sandbox `k` then needs the transformed prefix before it followed by every
/// transformed operation after it, which takes its own view to the composite's result.
#[derive(Debug, PartialEq)]
pub(crate) struct RoundPlan {
    pub(crate) composite: Operation,
    pub(crate) rebases: Vec<Operation>,
}

impl RoundPlan {
    pub(crate) fn new(ops: &[Operation]) -> Result<Self> {
        let mut prefix = Operation::identity();
        let mut prefixes = Vec::with_capacity(ops.len());
        let mut transformed = Vec::with_capacity(ops.len());

        for op in ops {
            let (prefix_after_op, op_after_prefix) = prefix.transform(op);
            prefix = prefix.compose(&op_after_prefix)?;
            prefixes.push(prefix_after_op);
            transformed.push(op_after_prefix);
        }

        let mut rebases = vec![Operation::identity(); ops.len()];
        let mut suffix = Operation::identity();
        for k in (0..ops.len()).rev() {
            rebases[k] = prefixes[k].compose(&suffix)?;
            suffix = transformed[k].compose(&suffix)?;
        }

        Ok(Self {
            composite: prefix,
            rebases,
        })
    }
}

struct Slot<Fut> {
    sandbox: Rc<RefCell<Sandbox>>,
    future: Option<Pin<Box<Fut>>>,
}

/// Runs per-caret logic against private sandboxes, publishing their edits once per round
///
/// Every round resumes each unfinished sandbox once, in caret order. A sandbox runs until it
/// awaits a commit with pending edits, finishes, or fails. The round's edits are then composed
/// and applied to the real document in one edit, every sandbox is rebased onto the result, the
/// caret sets are merged back, anchors are forwarded in one batch, and at most one history
/// checkpoint is recorded.
#[derive(Debug, Clone, Default)]
pub struct PerCaretOrchestrator {
    settings: OrchestratorSettings,
}

impl PerCaretOrchestrator {
    pub fn new(settings: OrchestratorSettings) -> Self {
        Self { settings }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(config.orchestrator.clone())
    }

    /// Run `logic` once per caret of `doc`, as one undoable command
    ///
    /// Failures inside the logic do not stop siblings; the first one is returned as
    /// [`EditorError::CaretLogic`] once every sandbox has completed, with the rest attached.
    pub fn run<F, Fut>(&self, doc: &mut Document, logic: F) -> Result<RunSummary>
    where
        F: FnMut(TransientEditor) -> Fut,
        Fut: Future<Output = anyhow::Result<()>>,
    {
        if doc.is_transient() {
            return Err(EditorError::NestedTransient);
        }
        doc.command(CommandKind::Other, None, |doc| self.run_rounds(doc, logic))
    }

    fn run_rounds<F, Fut>(&self, doc: &mut Document, mut logic: F) -> Result<RunSummary>
    where
        F: FnMut(TransientEditor) -> Fut,
        Fut: Future<Output = anyhow::Result<()>>,
    {
        let mut slots = Vec::with_capacity(doc.carets().len());
        for caret in doc.carets().carets() {
            let sandbox = Rc::new(RefCell::new(Sandbox::new(doc, caret)?));
            let future = logic(TransientEditor::new(Rc::clone(&sandbox)));
            slots.push(Slot {
                sandbox,
                future: Some(Box::pin(future)),
            });
        }

        let mut summary = RunSummary::default();
        let mut errors: Vec<anyhow::Error> = Vec::new();
        let mut cx = Context::from_waker(Waker::noop());

        while slots.iter().any(|slot| slot.future.is_some()) {
            if summary.rounds == self.settings.max_rounds {
                log::warn!(
                    "multi-caret run stopped after {} rounds",
                    self.settings.max_rounds
                );
                let limit = EditorError::RoundLimitExceeded {
                    max_rounds: self.settings.max_rounds,
                };
                if errors.is_empty() {
                    return Err(limit);
                }
                errors.push(anyhow::Error::new(limit));
                break;
            }
            summary.rounds += 1;
            log::debug!(
                "round {}: {} of {} sandboxes pending",
                summary.rounds,
                slots.iter().filter(|slot| slot.future.is_some()).count(),
                slots.len()
            );

            for (index, slot) in slots.iter_mut().enumerate() {
                if let Some(error) = dispatch(index, slot, &mut cx) {
                    errors.push(error);
                }
            }

            if self.finish_round(doc, &slots)? {
                summary.edits += 1;
            }
        }

        let mut errors = errors.into_iter();
        match errors.next() {
            None => Ok(summary),
            Some(source) => Err(EditorError::CaretLogic {
                source,
                suppressed: errors.collect(),
            }),
        }
    }

    /// Publish the round: apply, rebase, merge carets, forward anchors, checkpoint
    ///
    /// Returns whether the document text changed.
    fn finish_round<Fut>(&self, doc: &mut Document, slots: &[Slot<Fut>]) -> Result<bool> {
        let ops: Vec<Operation> = slots
            .iter()
            .map(|slot| slot.sandbox.borrow().accumulated.clone())
            .collect();
        let plan = RoundPlan::new(&ops)?;

        let changed = !plan.composite.is_identity();
        if changed {
            doc.edit(&plan.composite)?;
        }
        for (slot, rebase) in slots.iter().zip(&plan.rebases) {
            slot.sandbox.borrow_mut().rebase(rebase, &doc.buffer);
        }

        doc.replace_carets(merged_carets(doc, slots));

        let mut batch = AnchorBatch::default();
        for slot in slots {
            batch.extend(slot.sandbox.borrow_mut().take_forwarded());
        }
        if !batch.is_empty() {
            doc.batch_update_anchors(batch);
        }

        let mut checkpoint = false;
        for slot in slots {
            let mut sandbox = slot.sandbox.borrow_mut();
            checkpoint |= std::mem::take(&mut sandbox.checkpoint_requested);
            sandbox.refresh(doc.carets(), doc.anchors());
        }
        if checkpoint {
            doc.checkpoint();
        }

        Ok(changed)
    }
}

/// Resume one sandbox; returns the failure it raised, if any
fn dispatch<Fut>(index: usize, slot: &mut Slot<Fut>, cx: &mut Context<'_>) -> Option<anyhow::Error>
where
    Fut: Future<Output = anyhow::Result<()>>,
{
    let future = slot.future.as_mut()?;
    slot.sandbox.borrow_mut().begin_round();
    log::trace!("dispatching sandbox {index}");

    let failure = match future.as_mut().poll(cx) {
        Poll::Ready(Ok(())) => None,
        Poll::Ready(Err(error)) => {
            log::warn!("per-caret logic for sandbox {index} failed: {error:#}");
            Some(error)
        }
        Poll::Pending => {
            if slot.sandbox.borrow().state == SandboxState::SuspendedAtCommit {
                return None;
            }
            log::warn!("per-caret logic for sandbox {index} suspended outside commit");
            Some(anyhow::Error::new(EditorError::ForeignSuspension))
        }
    };

    let mut sandbox = slot.sandbox.borrow_mut();
    if failure.is_some() {
        sandbox.roll_back();
    }
    sandbox.complete();
    slot.future = None;
    failure
}

/// Sandbox carets plus the document's carets no sandbox is responsible for
fn merged_carets<Fut>(doc: &Document, slots: &[Slot<Fut>]) -> MultiCaretData {
    let mut owned: HashSet<CaretId> = HashSet::new();
    let mut carets: Vec<Caret> = Vec::new();
    for slot in slots {
        let sandbox = slot.sandbox.borrow();
        owned.extend(sandbox.owned.iter().copied());
        carets.extend(sandbox.view.carets().carets().iter().cloned());
    }
    carets.extend(
        doc.carets()
            .carets()
            .iter()
            .filter(|caret| !owned.contains(&caret.id()))
            .cloned(),
    );
    MultiCaretData::new(carets, doc.carets().primary_id())
}

/// Run `logic` once per caret with default settings
pub fn for_each_caret<F, Fut>(doc: &mut Document, logic: F) -> Result<RunSummary>
where
    F: FnMut(TransientEditor) -> Fut,
    Fut: Future<Output = anyhow::Result<()>>,
{
    PerCaretOrchestrator::default().run(doc, logic)
}
