//! Application controller: the single owner of client state.
//!
//! [`App`] ties the pieces together:
//!
//! - [`DatasetGateway`] delivers a flat node list,
//! - [`Hierarchy::build`] derives the parent/child index,
//! - [`render`] paints it with the current [`Selection`] highlighted,
//! - [`DetailView`] mirrors the selected node into an editable form,
//! - [`SessionSync`] mirrors {dataset, selection} back to the server.
//!
//! ## Concurrency
//!
//! All state lives in one [`AppState`] behind a mutex that is never held across an `.await`, so an
//! `App` can be cloned into concurrent tasks. Network calls are not cancellable. Each one captures
//! a [`LoadToken`] (the dataset generation at issue time) and its continuation re-checks the token
//! before mutating anything. A response for a dataset that is no longer active is dropped with
//! [`SubTreeError::Stale`].
//!
//! The requested dataset and the committed one are tracked apart. Edits and session saves always
//! target the committed tree, even while a load for another dataset is in flight or after one
//! failed.
//!
//! ## Local vs persisted apply
//!
//! [`App::apply_local`] edits the in-memory node only and never touches the network.
//! [`App::apply_persisted`] sends exactly one PATCH and, on success, replaces the whole tree with
//! the server's answer. On failure nothing local changes and an [`UiEvent::Alert`] is emitted.

use parking_lot::Mutex;
use std::sync::Arc;
use tokio::sync::mpsc::UnboundedSender;

use crate::{
    detail::{DetailForm, DetailView},
    error::{Result, SubTreeError},
    event::{EventOrigin, UiEvent},
    gateway::DatasetGateway,
    hierarchy::{self, Hierarchy},
    model::{NodeId, Tree},
    render::{apply_connectors, render, Measure, RenderedTree},
    selection::Selection,
    session::SessionSync,
};

/// Dataset generation captured when a request is issued.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadToken {
    pub generation: u64,
    pub sub_name: Option<String>,
}

/// Everything the UI shows, owned by one controller.
#[derive(Debug, Default)]
pub struct AppState {
    tree: Option<Tree>,
    hierarchy: Hierarchy,
    selection: Selection,
    rendered: RenderedTree,
    detail: DetailView,
    caption: Option<String>,
    /// Dataset most recently asked for. Only used to recognise stale responses.
    requested_sub: Option<String>,
    generation: u64,
    geometry_pending: bool,
    local_edits: bool,
    restored: bool,
}

impl AppState {
    pub fn tree(&self) -> Option<&Tree> {
        self.tree.as_ref()
    }

    pub fn selected(&self) -> Option<&NodeId> {
        self.selection.current()
    }

    pub fn rendered(&self) -> &RenderedTree {
        &self.rendered
    }

    pub fn detail(&self) -> &DetailView {
        &self.detail
    }

    pub fn caption(&self) -> Option<&str> {
        self.caption.as_deref()
    }

    /// Name of the committed tree.
    pub fn active_sub(&self) -> Option<&str> {
        self.tree.as_ref().map(|t| t.sub_name.as_str())
    }

    pub fn geometry_pending(&self) -> bool {
        self.geometry_pending
    }

    /// True when the tree carries speculative edits that were never persisted.
    pub fn has_local_edits(&self) -> bool {
        self.local_edits
    }

    fn token(&self) -> LoadToken {
        LoadToken {
            generation: self.generation,
            sub_name: self.requested_sub.clone(),
        }
    }

    fn is_current(&self, token: &LoadToken) -> bool {
        self.generation == token.generation && self.requested_sub == token.sub_name
    }

    /// Request `sub_name`; every request issued before this becomes stale.
    fn begin(&mut self, sub_name: Option<String>) -> LoadToken {
        self.generation += 1;
        self.requested_sub = sub_name;
        self.token()
    }

    /// A request failed: fall back to asking for whatever is committed.
    fn abandon_request(&mut self) {
        self.requested_sub = self.tree.as_ref().map(|t| t.sub_name.clone());
    }

    /// Invalidate in-flight requests without changing the requested dataset.
    fn bump(&mut self) -> LoadToken {
        self.generation += 1;
        self.token()
    }

    /// Replace the whole tree. Selection is dropped and only `reselect` is re-established.
    fn replace_tree(&mut self, tree: Tree, reselect: Option<NodeId>) {
        hierarchy::diagnose(&tree.nodes);
        self.hierarchy = Hierarchy::build(&tree.nodes);
        self.tree = Some(tree);
        self.local_edits = false;
        self.selection.clear();
        if let Some(id) = reselect {
            if self.tree.as_ref().is_some_and(|t| t.contains(&id)) {
                self.selection.select(id);
            }
        }
        self.refresh();
    }

    /// Full re-render plus detail rebuild from current tree and selection.
    fn refresh(&mut self) {
        let selected = self.selection.resolve(self.tree.as_ref());
        self.rendered = render(self.tree.as_ref(), &self.hierarchy, selected);
        self.detail = DetailView::for_node(
            selected.and_then(|id| self.tree.as_ref().and_then(|t| t.get(id))),
        );
        self.geometry_pending = true;
    }
}

/// The controller. Cheap to clone; clones share state.
#[derive(Clone)]
pub struct App {
    state: Arc<Mutex<AppState>>,
    gateway: Arc<dyn DatasetGateway>,
    session: Arc<SessionSync>,
    events: Option<UnboundedSender<UiEvent>>,
}

impl App {
    pub fn new(gateway: Arc<dyn DatasetGateway>) -> Self {
        App {
            state: Arc::new(Mutex::new(AppState::default())),
            session: Arc::new(SessionSync::new(gateway.clone())),
            gateway,
            events: None,
        }
    }

    /// Emit [`UiEvent`]s on `tx` from now on.
    pub fn with_events(mut self, tx: UnboundedSender<UiEvent>) -> Self {
        self.events = Some(tx);
        self
    }

    /// Read state under the lock.
    pub fn with_state<R>(&self, f: impl FnOnce(&AppState) -> R) -> R {
        f(&self.state.lock())
    }

    pub fn tree(&self) -> Option<Tree> {
        self.with_state(|s| s.tree.clone())
    }

    pub fn selected(&self) -> Option<NodeId> {
        self.with_state(|s| s.selected().cloned())
    }

    pub fn rendered(&self) -> RenderedTree {
        self.with_state(|s| s.rendered.clone())
    }

    pub fn detail(&self) -> DetailView {
        self.with_state(|s| s.detail.clone())
    }

    pub fn caption(&self) -> Option<String> {
        self.with_state(|s| s.caption.clone())
    }

    pub fn active_sub(&self) -> Option<String> {
        self.with_state(|s| s.active_sub().map(str::to_string))
    }

    pub fn session(&self) -> &SessionSync {
        &self.session
    }

    fn emit(&self, event: UiEvent) {
        tracing::trace!("[App] {}", event);
        if let Some(tx) = &self.events {
            let _ = tx.send(event);
        }
    }

    fn set_caption(&self, state: &mut AppState, caption: Option<String>) {
        state.caption = caption.clone();
        if let Some(text) = caption {
            self.emit(UiEvent::Caption(text));
        }
    }

    fn save_session(&self, state: &AppState) {
        self.session
            .save(state.active_sub().map(str::to_string), state.selected().cloned());
    }

    fn committed(&self, state: &AppState, origin: EventOrigin) {
        if let Some(tree) = &state.tree {
            self.emit(UiEvent::TreeReplaced {
                sub_name: tree.sub_name.clone(),
                origin,
            });
        }
        self.emit(UiEvent::SelectionChanged(state.selected().cloned()));
        self.emit(UiEvent::DetailRefreshed);
        self.emit(UiEvent::GeometryPending);
    }

    /// Fetch the dataset list. Failures leave a caption and are returned.
    pub async fn list_datasets(&self) -> Result<Vec<String>> {
        match self.gateway.list_subs().await {
            Ok(subs) => Ok(subs),
            Err(e) => {
                tracing::warn!("[App] could not list datasets: {}", e);
                let mut state = self.state.lock();
                self.set_caption(&mut state, Some("Could not load the SUB list.".to_string()));
                Err(e)
            }
        }
    }

    /// Make `sub_name` active and load its tree. Selection is cleared.
    pub async fn load_dataset(&self, sub_name: &str) -> Result<()> {
        self.load(sub_name, None, true).await
    }

    async fn load(&self, sub_name: &str, reselect: Option<NodeId>, save: bool) -> Result<()> {
        let token = {
            let mut state = self.state.lock();
            let token = state.begin(Some(sub_name.to_string()));
            self.set_caption(&mut state, Some(format!("Loading {sub_name}...")));
            token
        };
        tracing::info!("[App] loading {} (generation {})", sub_name, token.generation);

        let result = self.gateway.fetch_tree(sub_name).await;

        let mut state = self.state.lock();
        if !state.is_current(&token) {
            tracing::warn!(
                "[App] dropping response for {} (generation {} superseded by {})",
                sub_name,
                token.generation,
                state.generation
            );
            self.emit(UiEvent::StaleDiscarded {
                sub_name: sub_name.to_string(),
            });
            return Err(SubTreeError::Stale(sub_name.to_string()));
        }
        match result {
            Ok(tree) => {
                if tree.sub_name != sub_name {
                    tracing::debug!(
                        "[App] server answered {} for requested {}",
                        tree.sub_name,
                        sub_name
                    );
                }
                state.replace_tree(tree, reselect);
                self.set_caption(&mut state, None);
                self.committed(&state, EventOrigin::Remote);
                if save {
                    self.save_session(&state);
                }
                Ok(())
            }
            Err(e) => {
                tracing::warn!("[App] could not load {}: {}", sub_name, e);
                state.abandon_request();
                self.set_caption(&mut state, Some(format!("Could not load {sub_name}.")));
                Err(e)
            }
        }
    }

    /// Select `id` in the current tree.
    pub fn select(&self, id: impl Into<NodeId>) -> Result<()> {
        let id = id.into();
        let mut state = self.state.lock();
        if !state.tree.as_ref().is_some_and(|t| t.contains(&id)) {
            return Err(SubTreeError::NotFound(format!("node {id} is not in the active tree")));
        }
        state.selection.select(id);
        self.after_selection(&mut state);
        Ok(())
    }

    /// Clear the selection. The detail panel goes empty.
    pub fn clear(&self) {
        let mut state = self.state.lock();
        state.selection.clear();
        self.after_selection(&mut state);
    }

    fn after_selection(&self, state: &mut AppState) {
        state.refresh();
        self.emit(UiEvent::SelectionChanged(state.selected().cloned()));
        self.emit(UiEvent::DetailRefreshed);
        self.emit(UiEvent::GeometryPending);
        self.save_session(state);
    }

    /// Speculative edit: write `form` onto the selected in-memory node and re-render.
    ///
    /// Not sent to the server and lost on reload.
    pub fn apply_local(&self, form: &DetailForm) -> Result<()> {
        let patch = form.parse()?;
        let mut guard = self.state.lock();
        let state = &mut *guard;
        let Some(id) = state.selected().cloned() else {
            return Err(SubTreeError::InvalidInput("no node is selected".to_string()));
        };
        let node = state
            .tree
            .as_mut()
            .and_then(|t| t.get_mut(&id))
            .ok_or_else(|| SubTreeError::NotFound(format!("node {id}")))?;
        patch.apply(node);

        if let Some(tree) = &state.tree {
            state.hierarchy = Hierarchy::build(&tree.nodes);
        }
        state.local_edits = true;
        state.selection.select(id);
        state.refresh();
        self.committed(state, EventOrigin::Local);
        Ok(())
    }

    /// Authoritative edit: PATCH the selected node and adopt the server's tree.
    pub async fn apply_persisted(&self, form: &DetailForm) -> Result<()> {
        let patch = match form.parse() {
            Ok(patch) => patch,
            Err(e) => return Err(self.alert(e)),
        };
        let (token, sub_name, id) = {
            let state = self.state.lock();
            let Some(sub_name) = state.active_sub().map(str::to_string) else {
                return Err(self.alert(SubTreeError::InvalidInput("no SUB is active".to_string())));
            };
            let Some(id) = state.selected().cloned() else {
                return Err(self.alert(SubTreeError::InvalidInput(
                    "no node is selected".to_string(),
                )));
            };
            (state.token(), sub_name, id)
        };

        let tree = match self.gateway.patch_node(&sub_name, &id, &patch).await {
            Ok(tree) => tree,
            Err(e) => return Err(self.alert(e)),
        };

        let mut state = self.state.lock();
        if !state.is_current(&token) {
            tracing::warn!("[App] dropping patch response for {}", sub_name);
            self.emit(UiEvent::StaleDiscarded { sub_name: sub_name.clone() });
            return Err(SubTreeError::Stale(sub_name));
        }
        tracing::info!("[App] node {} of {} saved", id, sub_name);
        // The user may have moved on while the PATCH was in flight.
        let reselect = state.selected().cloned();
        state.replace_tree(tree, reselect);
        self.committed(&state, EventOrigin::Remote);
        self.save_session(&state);
        Ok(())
    }

    fn alert(&self, e: SubTreeError) -> SubTreeError {
        tracing::warn!("[App] save failed: {}", e);
        self.emit(UiEvent::Alert(format!("Save failed: {e}")));
        e
    }

    /// Upload a source file; the resulting tree becomes the active dataset.
    pub async fn upload(&self, filename: &str, bytes: Vec<u8>) -> Result<()> {
        let token = self.state.lock().bump();
        let tree = match self.gateway.upload(filename, bytes).await {
            Ok(tree) => tree,
            Err(e) => {
                tracing::warn!("[App] upload of {} failed: {}", filename, e);
                self.emit(UiEvent::Alert(format!("Upload failed: {e}")));
                return Err(e);
            }
        };
        let mut state = self.state.lock();
        if !state.is_current(&token) {
            tracing::warn!("[App] dropping upload response for {}", tree.sub_name);
            self.emit(UiEvent::StaleDiscarded {
                sub_name: tree.sub_name.clone(),
            });
            return Err(SubTreeError::Stale(tree.sub_name));
        }
        state.requested_sub = Some(tree.sub_name.clone());
        state.replace_tree(tree, None);
        self.set_caption(&mut state, None);
        self.committed(&state, EventOrigin::Remote);
        self.save_session(&state);
        Ok(())
    }

    /// Restore dataset and selection from the server-held session. Runs at most once.
    ///
    /// Best-effort: any failure leaves the default (no dataset) state and returns `false`.
    pub async fn restore(&self) -> bool {
        {
            let mut state = self.state.lock();
            if std::mem::replace(&mut state.restored, true) {
                tracing::debug!("[App] session already restored");
                return false;
            }
        }
        let Some(session) = self.session.load().await else {
            return false;
        };
        let Some(sub_name) = session.sub_name else {
            tracing::debug!("[App] no saved dataset to restore");
            return false;
        };
        if let Err(e) = self.load(&sub_name, session.selected_id.clone(), false).await {
            tracing::warn!("[App] session restore aborted: {}", e);
            let mut state = self.state.lock();
            if state.tree.is_none() && state.requested_sub.is_none() {
                self.set_caption(&mut state, None);
            }
            return false;
        }
        if let Some(id) = &session.selected_id {
            if self.selected().as_ref() != Some(id) {
                tracing::warn!("[App] saved selection {} is not in {}", id, sub_name);
            }
        }
        true
    }

    /// Run the deferred connector geometry pass if a render is waiting for it.
    ///
    /// `measure` receives the committed render and returns its on-screen measurement.
    pub fn on_frame<M: Measure>(&self, measure: impl FnOnce(&RenderedTree) -> M) -> bool {
        let mut state = self.state.lock();
        if !state.geometry_pending {
            return false;
        }
        let measured = measure(&state.rendered);
        apply_connectors(&mut state.rendered, &measured);
        state.geometry_pending = false;
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        model::SessionState,
        render::StackedLayout,
        tests::helpers::{node, sample_tree, FakeGateway},
    };
    use tokio::sync::mpsc;

    fn app_with(gateway: &Arc<FakeGateway>) -> App {
        App::new(gateway.clone())
    }

    fn lamp_gateway() -> Arc<FakeGateway> {
        Arc::new(FakeGateway::with_trees(vec![
            sample_tree("Lamp"),
            Tree::new(
                "Mirror",
                vec![node("m1", None, 0, "Mirror"), node("m2", Some("m1"), 0, "Glass")],
            ),
        ]))
    }

    fn form_for(app: &App) -> DetailForm {
        match app.detail() {
            DetailView::Node { form, .. } => form,
            DetailView::Empty => panic!("expected a selected node"),
        }
    }

    #[tokio::test]
    async fn load_renders_and_saves_session() {
        let gateway = lamp_gateway();
        let app = app_with(&gateway);
        app.load_dataset("Lamp").await.unwrap();

        assert_eq!(app.active_sub().as_deref(), Some("Lamp"));
        assert!(app.caption().is_none());
        assert_eq!(app.rendered().views().len(), 5);
        assert!(app.detail().is_empty());

        app.session().flush().await;
        assert_eq!(gateway.session(), SessionState::new(Some("Lamp".into()), None));
    }

    #[tokio::test]
    async fn select_highlights_and_fills_detail() {
        let gateway = lamp_gateway();
        let app = app_with(&gateway);
        app.load_dataset("Lamp").await.unwrap();
        app.select("2").unwrap();

        let rendered = app.rendered();
        let marked = rendered.selected();
        assert_eq!(marked.len(), 1);
        assert_eq!(marked[0].id, NodeId::from("2"));
        assert_eq!(form_for(&app).name, "Housing");

        assert!(matches!(app.select("nope"), Err(SubTreeError::NotFound(_))));
        assert_eq!(app.selected(), Some(NodeId::from("2")));

        app.clear();
        assert!(app.rendered().selected().is_empty());
        assert!(app.detail().is_empty());

        app.session().flush().await;
        let saved = gateway.saved_sessions();
        assert_eq!(
            saved[saved.len() - 2],
            SessionState::new(Some("Lamp".into()), Some(NodeId::from("2")))
        );
        assert_eq!(saved.last(), Some(&SessionState::new(Some("Lamp".into()), None)));
    }

    #[tokio::test]
    async fn loading_another_dataset_clears_selection() {
        let gateway = lamp_gateway();
        let app = app_with(&gateway);
        app.load_dataset("Lamp").await.unwrap();
        app.select("3").unwrap();
        app.load_dataset("Mirror").await.unwrap();

        assert!(app.selected().is_none());
        assert!(app.detail().is_empty());
        assert!(app.rendered().selected().is_empty());
    }

    #[tokio::test]
    async fn local_apply_never_touches_the_network() {
        let gateway = lamp_gateway();
        let app = app_with(&gateway);
        app.load_dataset("Lamp").await.unwrap();
        app.select("5").unwrap();
        app.session().flush().await;
        let calls_before = gateway.calls().len();

        let mut form = form_for(&app);
        form.name = "Machine screw".into();
        form.qty = "6".into();
        app.apply_local(&form).unwrap();
        app.session().flush().await;

        assert_eq!(gateway.calls().len(), calls_before);
        let tree = app.tree().unwrap();
        let screw = tree.get(&NodeId::from("5")).unwrap();
        assert_eq!(screw.name, "Machine screw");
        assert_eq!(screw.qty, Some(6.0));
        assert_eq!(app.selected(), Some(NodeId::from("5")));
        assert!(app.with_state(|s| s.has_local_edits()));
        // Server copy is untouched.
        let server = gateway.tree("Lamp").unwrap();
        assert_eq!(server.get(&NodeId::from("5")).unwrap().name, "Screw");
    }

    #[tokio::test]
    async fn local_apply_rejects_bad_quantity() {
        let gateway = lamp_gateway();
        let app = app_with(&gateway);
        app.load_dataset("Lamp").await.unwrap();
        app.select("5").unwrap();

        let mut form = form_for(&app);
        form.qty = "four".into();
        assert!(matches!(
            app.apply_local(&form),
            Err(SubTreeError::InvalidInput(_))
        ));
        let tree = app.tree().unwrap();
        assert_eq!(tree.get(&NodeId::from("5")).unwrap().qty, Some(4.0));
    }

    #[tokio::test]
    async fn persisted_apply_sends_one_patch_and_adopts_server_tree() {
        let gateway = lamp_gateway();
        let app = app_with(&gateway);
        app.load_dataset("Lamp").await.unwrap();
        app.select("2").unwrap();

        let mut form = form_for(&app);
        form.qty = "5".into();
        app.apply_persisted(&form).await.unwrap();

        assert_eq!(gateway.count("PATCH /api/subs/Lamp/nodes/2"), 1);
        let (_, id, patch) = gateway.patches().pop().unwrap();
        assert_eq!(id, NodeId::from("2"));
        assert_eq!(patch.qty, Some(Some(5.0)));
        assert_eq!(app.tree(), gateway.tree("Lamp"));
        assert_eq!(app.selected(), Some(NodeId::from("2")));

        form.qty = "".into();
        app.apply_persisted(&form).await.unwrap();
        let (_, _, patch) = gateway.patches().pop().unwrap();
        assert_eq!(patch.qty, Some(None));
        assert_eq!(
            serde_json::to_value(&patch).unwrap()["qty"],
            serde_json::Value::Null
        );
    }

    #[tokio::test]
    async fn persisted_apply_failure_alerts_and_keeps_state() {
        let gateway = lamp_gateway();
        let (tx, mut rx) = mpsc::unbounded_channel();
        let app = app_with(&gateway).with_events(tx);
        app.load_dataset("Lamp").await.unwrap();
        app.select("2").unwrap();
        let before = app.tree();

        gateway.fail_patches(true);
        let mut form = form_for(&app);
        form.name = "Changed".into();
        assert!(app.apply_persisted(&form).await.is_err());
        assert_eq!(app.tree(), before);
        assert_eq!(app.selected(), Some(NodeId::from("2")));
        assert_eq!(gateway.patches().len(), 1);

        let mut alerts = 0;
        while let Ok(event) = rx.try_recv() {
            if matches!(event, UiEvent::Alert(_)) {
                alerts += 1;
            }
        }
        assert_eq!(alerts, 1);
    }

    #[tokio::test]
    async fn persisted_apply_validates_before_sending() {
        let gateway = lamp_gateway();
        let app = app_with(&gateway);
        app.load_dataset("Lamp").await.unwrap();
        app.select("2").unwrap();
        let mut form = form_for(&app);
        form.qty = "1,5".into();
        assert!(matches!(
            app.apply_persisted(&form).await,
            Err(SubTreeError::InvalidInput(_))
        ));
        assert!(gateway.patches().is_empty());
    }

    #[tokio::test]
    async fn stale_tree_response_is_discarded() {
        let gateway = lamp_gateway();
        let app = app_with(&gateway);
        let gate = gateway.gate("Lamp");

        let slow = app.clone();
        let pending = tokio::spawn(async move { slow.load_dataset("Lamp").await });
        tokio::task::yield_now().await;

        app.load_dataset("Mirror").await.unwrap();
        gate.notify_one();
        let result = pending.await.unwrap();

        assert!(matches!(result, Err(SubTreeError::Stale(_))));
        assert_eq!(app.active_sub().as_deref(), Some("Mirror"));
        assert_eq!(app.tree().unwrap().sub_name, "Mirror");
    }

    #[tokio::test]
    async fn stale_patch_response_is_discarded() {
        let gateway = lamp_gateway();
        let app = app_with(&gateway);
        app.load_dataset("Lamp").await.unwrap();
        app.select("2").unwrap();
        let gate = gateway.gate_patches("Lamp");

        let mut form = form_for(&app);
        form.name = "Shell".into();
        let slow = app.clone();
        let pending = tokio::spawn(async move { slow.apply_persisted(&form).await });
        tokio::task::yield_now().await;

        app.load_dataset("Mirror").await.unwrap();
        gate.notify_one();
        let result = pending.await.unwrap();

        assert!(matches!(result, Err(SubTreeError::Stale(_))));
        assert_eq!(app.active_sub().as_deref(), Some("Mirror"));
        assert_eq!(app.tree(), gateway.tree("Mirror"));
        assert!(app.selected().is_none());
    }

    #[tokio::test]
    async fn stale_upload_response_is_discarded() {
        let gateway = lamp_gateway();
        let app = app_with(&gateway);
        let gate = gateway.gate_uploads();

        let tree = Tree::new("Fog", vec![node("f", None, 0, "Fog lamp")]);
        let bytes = serde_json::to_vec(&tree).unwrap();
        let slow = app.clone();
        let pending = tokio::spawn(async move { slow.upload("fog.json", bytes).await });
        tokio::task::yield_now().await;

        app.load_dataset("Mirror").await.unwrap();
        gate.notify_one();
        let result = pending.await.unwrap();

        assert!(matches!(result, Err(SubTreeError::Stale(_))));
        assert_eq!(app.active_sub().as_deref(), Some("Mirror"));
        assert_eq!(app.tree().unwrap().sub_name, "Mirror");
    }

    #[tokio::test]
    async fn selection_made_during_patch_is_kept() {
        let gateway = lamp_gateway();
        let app = app_with(&gateway);
        app.load_dataset("Lamp").await.unwrap();
        app.select("2").unwrap();
        let gate = gateway.gate_patches("Lamp");

        let mut form = form_for(&app);
        form.name = "Shell".into();
        let slow = app.clone();
        let pending = tokio::spawn(async move { slow.apply_persisted(&form).await });
        tokio::task::yield_now().await;

        app.select("4").unwrap();
        gate.notify_one();
        pending.await.unwrap().unwrap();

        assert_eq!(app.selected(), Some(NodeId::from("4")));
        assert_eq!(form_for(&app).name, "Bracket");
        let tree = app.tree().unwrap();
        assert_eq!(tree.get(&NodeId::from("2")).unwrap().name, "Shell");
        let rendered = app.rendered();
        assert_eq!(rendered.selected().len(), 1);
        assert_eq!(rendered.selected()[0].id, NodeId::from("4"));

        app.session().flush().await;
        assert_eq!(
            gateway.saved_sessions().last(),
            Some(&SessionState::new(Some("Lamp".into()), Some(NodeId::from("4"))))
        );
    }

    #[tokio::test]
    async fn failed_load_keeps_editing_the_committed_tree() {
        let gateway = lamp_gateway();
        let app = app_with(&gateway);
        app.load_dataset("Lamp").await.unwrap();
        app.select("2").unwrap();

        assert!(app.load_dataset("Gone").await.is_err());
        assert_eq!(app.active_sub().as_deref(), Some("Lamp"));
        assert_eq!(app.selected(), Some(NodeId::from("2")));

        let mut form = form_for(&app);
        form.name = "Shell".into();
        app.apply_persisted(&form).await.unwrap();
        let (sub_name, id, _) = gateway.patches().pop().unwrap();
        assert_eq!(sub_name, "Lamp");
        assert_eq!(id, NodeId::from("2"));
        assert_eq!(gateway.count("PATCH /api/subs/Gone/nodes/2"), 0);

        app.select("3").unwrap();
        app.session().flush().await;
        assert_eq!(
            gateway.saved_sessions().last(),
            Some(&SessionState::new(Some("Lamp".into()), Some(NodeId::from("3"))))
        );
        assert!(gateway
            .saved_sessions()
            .iter()
            .all(|s| s.sub_name.as_deref() == Some("Lamp")));
    }

    #[tokio::test]
    async fn edits_during_a_pending_load_target_the_committed_tree() {
        let gateway = lamp_gateway();
        let app = app_with(&gateway);
        app.load_dataset("Lamp").await.unwrap();
        app.select("2").unwrap();
        let gate = gateway.gate("Mirror");

        let slow = app.clone();
        let pending = tokio::spawn(async move { slow.load_dataset("Mirror").await });
        tokio::task::yield_now().await;
        assert_eq!(app.active_sub().as_deref(), Some("Lamp"));

        let mut form = form_for(&app);
        form.name = "Shell".into();
        app.apply_persisted(&form).await.unwrap();
        assert_eq!(gateway.count("PATCH /api/subs/Lamp/nodes/2"), 1);
        assert_eq!(gateway.count("PATCH /api/subs/Mirror/nodes/2"), 0);

        gate.notify_one();
        pending.await.unwrap().unwrap();
        assert_eq!(app.active_sub().as_deref(), Some("Mirror"));
        assert!(app.selected().is_none());
    }

    #[tokio::test]
    async fn restore_with_empty_session_does_nothing() {
        let gateway = lamp_gateway();
        let app = app_with(&gateway);
        assert!(!app.restore().await);
        assert_eq!(gateway.calls(), vec!["GET /api/state".to_string()]);
        assert!(app.tree().is_none());
        assert!(app.selected().is_none());
    }

    #[tokio::test]
    async fn restore_reselects_saved_node_once() {
        let gateway = lamp_gateway();
        gateway.seed_session(SessionState::new(
            Some("Lamp".into()),
            Some(NodeId::from("4")),
        ));
        let app = app_with(&gateway);
        assert!(app.restore().await);
        assert_eq!(app.selected(), Some(NodeId::from("4")));
        assert_eq!(form_for(&app).name, "Bracket");
        assert!(!app.restore().await);

        app.session().flush().await;
        assert_eq!(gateway.count("GET /api/state"), 1);
        assert_eq!(
            gateway.session().selected_id,
            Some(NodeId::from("4")),
            "restoring must not overwrite the saved selection"
        );
    }

    #[tokio::test]
    async fn restore_failure_is_silent() {
        let gateway = lamp_gateway();
        gateway.seed_session(SessionState::new(Some("Gone".into()), None));
        let app = app_with(&gateway);
        assert!(!app.restore().await);
        assert!(app.tree().is_none());
        assert!(app.caption().is_none());
        assert_eq!(app.rendered(), RenderedTree::default());
    }

    #[tokio::test]
    async fn upload_activates_tree() {
        let gateway = lamp_gateway();
        let app = app_with(&gateway);
        let tree = Tree::new("Fog", vec![node("f", None, 0, "Fog lamp")]);
        app.upload("fog.json", serde_json::to_vec(&tree).unwrap())
            .await
            .unwrap();
        assert_eq!(app.active_sub().as_deref(), Some("Fog"));
        assert_eq!(app.rendered().views().len(), 1);
    }

    #[tokio::test]
    async fn geometry_pass_runs_once_per_render() {
        let gateway = lamp_gateway();
        let app = app_with(&gateway);
        app.load_dataset("Lamp").await.unwrap();
        let layout = StackedLayout::default();
        assert!(app.on_frame(|r| layout.measure(r)));
        assert!(!app.on_frame(|r| layout.measure(r)));
        let rendered = app.rendered();
        assert!(rendered
            .views()
            .iter()
            .filter_map(|v| v.children.as_ref())
            .all(|c| c.connector.is_some()));

        app.select("3").unwrap();
        assert!(app.with_state(|s| s.geometry_pending()));
    }

    #[tokio::test]
    async fn list_failure_sets_caption() {
        let gateway = lamp_gateway();
        let app = app_with(&gateway);
        assert_eq!(app.list_datasets().await.unwrap(), vec!["Lamp", "Mirror"]);
        gateway.fail_all(true);
        assert!(app.list_datasets().await.is_err());
        assert!(app.caption().is_some());
    }
}
