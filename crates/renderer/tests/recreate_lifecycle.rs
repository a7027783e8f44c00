//! Recreate lifecycle audit.
//!
//! The renderer groups every swapchain-extent-dependent object into one
//! aggregate whose field order is its drop order; a recreate drops the
//! aggregate and builds a fresh one. These tests model that pattern
//! with a counting ledger and assert the property it exists to
//! provide: every created resource is destroyed exactly once, whether
//! the aggregate is recreated once, twice in a row, or never.

use std::cell::RefCell;
use std::rc::Rc;

/// Counts paired create/destroy calls per resource kind.
#[derive(Default)]
struct Ledger {
    created: RefCell<Vec<&'static str>>,
    destroyed: RefCell<Vec<&'static str>>,
}

impl Ledger {
    fn create(&self, kind: &'static str) {
        self.created.borrow_mut().push(kind);
    }

    fn destroy(&self, kind: &'static str) {
        self.destroyed.borrow_mut().push(kind);
    }

    fn balance(&self) -> (usize, usize) {
        (self.created.borrow().len(), self.destroyed.borrow().len())
    }
}

/// One tracked resource; destruction is reported from Drop, the same
/// way the real RAII wrappers destroy their Vulkan handles.
struct Tracked {
    ledger: Rc<Ledger>,
    kind: &'static str,
}

impl Tracked {
    fn new(ledger: Rc<Ledger>, kind: &'static str) -> Self {
        ledger.create(kind);
        Self { ledger, kind }
    }
}

impl Drop for Tracked {
    fn drop(&mut self) {
        self.ledger.destroy(self.kind);
    }
}

/// Stand-in for the extent-dependent aggregate. Field order is drop
/// order, mirroring the renderer's resource grouping.
struct ExtentResources {
    _command_buffers: Vec<Tracked>,
    _framebuffers: Vec<Tracked>,
    _pipelines: [Tracked; 2],
    _render_passes: [Tracked; 2],
    _uniform_buffers: Vec<Tracked>,
    _gbuffer: [Tracked; 3],
}

fn build(ledger: &Rc<Ledger>, image_count: usize) -> ExtentResources {
    ExtentResources {
        _command_buffers: (0..image_count)
            .map(|_| Tracked::new(ledger.clone(), "command buffer"))
            .collect(),
        _framebuffers: (0..image_count)
            .map(|_| Tracked::new(ledger.clone(), "framebuffer"))
            .collect(),
        _pipelines: [
            Tracked::new(ledger.clone(), "pipeline"),
            Tracked::new(ledger.clone(), "pipeline"),
        ],
        _render_passes: [
            Tracked::new(ledger.clone(), "render pass"),
            Tracked::new(ledger.clone(), "render pass"),
        ],
        _uniform_buffers: (0..image_count)
            .map(|_| Tracked::new(ledger.clone(), "uniform buffer"))
            .collect(),
        _gbuffer: [
            Tracked::new(ledger.clone(), "attachment"),
            Tracked::new(ledger.clone(), "attachment"),
            Tracked::new(ledger.clone(), "attachment"),
        ],
    }
}

fn recreate(ledger: &Rc<Ledger>, slot: &mut Option<ExtentResources>, image_count: usize) {
    // Teardown first, in the aggregate's declared order, then rebuild.
    *slot = None;
    *slot = Some(build(ledger, image_count));
}

#[test]
fn test_teardown_balances_creation() {
    let ledger = Rc::new(Ledger::default());
    let resources = Some(build(&ledger, 3));
    drop(resources);

    let (created, destroyed) = ledger.balance();
    assert_eq!(created, destroyed);
    assert_eq!(*ledger.created.borrow(), *ledger.destroyed.borrow());
}

#[test]
fn test_single_recreate_leaks_nothing() {
    let ledger = Rc::new(Ledger::default());
    let mut slot = Some(build(&ledger, 3));

    recreate(&ledger, &mut slot, 3);

    // Exactly one generation is live; the first generation's destroys
    // pair its creates.
    let (created, destroyed) = ledger.balance();
    assert_eq!(created, 2 * destroyed);

    drop(slot);
    let (created, destroyed) = ledger.balance();
    assert_eq!(created, destroyed);
}

#[test]
fn test_double_recreate_matches_single() {
    // Recreating twice in succession must end in the same state as
    // recreating once: one live generation, all others fully paired.
    let run = |recreates: usize| {
        let ledger = Rc::new(Ledger::default());
        let mut slot = Some(build(&ledger, 3));
        for _ in 0..recreates {
            recreate(&ledger, &mut slot, 3);
        }
        let (created, destroyed) = ledger.balance();
        let live = created - destroyed;
        drop(slot);
        let (created, destroyed) = ledger.balance();
        assert_eq!(created, destroyed);
        live
    };

    assert_eq!(run(1), run(2));
}

#[test]
fn test_recreate_with_changed_image_count() {
    // A resize can change the presentable image count; the new
    // generation is sized to it and the old one still pairs fully.
    let ledger = Rc::new(Ledger::default());
    let mut slot = Some(build(&ledger, 2));

    recreate(&ledger, &mut slot, 4);
    drop(slot);

    let (created, destroyed) = ledger.balance();
    assert_eq!(created, destroyed);
}
