use super::{ActionResult, Outcome};
use mcarch_model::{FileRef, Patch, PatchField};
use std::collections::HashMap;

enum Entry {
    /// Accepted; index into `results`.
    Accepted { result: usize, value: String },
    /// Two different values were seen; every later patch for the field is a
    /// conflict too.
    Conflicted,
}

/// Records action results in completion order and keeps the patch list
/// consistent: one value per `(file, field)`. A second, different value for
/// the same field turns *both* results into [`Outcome::PatchConflict`] and
/// drops the earlier patch. Repeating the same value is harmless.
#[derive(Default)]
pub(crate) struct PatchLedger {
    results: Vec<ActionResult>,
    fields: HashMap<(FileRef, PatchField), Entry>,
}

impl PatchLedger {
    pub(crate) fn record(&mut self, mut result: ActionResult) {
        let index = self.results.len();
        let patch = match &result.outcome {
            Outcome::Succeeded { patch: Some(patch) } => Some(patch.clone()),
            _ => None,
        };
        if let Some(patch) = patch {
            let field = (patch.file.clone(), patch.field);
            match self.fields.get(&field) {
                None => {
                    self.fields.insert(field, Entry::Accepted { result: index, value: patch.value.clone() });
                },
                Some(Entry::Accepted { value, .. }) if *value == patch.value => {
                    // Same value again: keep the first, don't patch twice.
                    result.outcome = Outcome::Succeeded { patch: None };
                },
                Some(Entry::Accepted { result: earlier, .. }) => {
                    let earlier = *earlier;
                    let first = match &self.results[earlier].outcome {
                        Outcome::Succeeded { patch: Some(first) } => Some(first.clone()),
                        _ => None,
                    };
                    if let Some(first) = first {
                        tracing::warn!(file = %first.file, field = %first.field, first = %first.value, second = %patch.value, "Conflicting metadata patches");
                        self.results[earlier].outcome = Outcome::PatchConflict { patch: first };
                    }
                    result.outcome = Outcome::PatchConflict { patch: patch.clone() };
                    self.fields.insert(field, Entry::Conflicted);
                },
                Some(Entry::Conflicted) => {
                    result.outcome = Outcome::PatchConflict { patch };
                },
            }
        }
        self.results.push(result);
    }

    /// Results in completion order, and the patches that survived.
    pub(crate) fn finish(self) -> (Vec<ActionResult>, Vec<Patch>) {
        let patches = self
            .results
            .iter()
            .filter_map(|r| match &r.outcome {
                Outcome::Succeeded { patch: Some(patch) } => Some(patch.clone()),
                _ => None,
            })
            .collect();
        (self.results, patches)
    }
}
