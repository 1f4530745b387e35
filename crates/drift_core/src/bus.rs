//! Phased event dispatch with a fixed fan-out direction per phase.

/// Lifecycle phases fanned out by the [`LifecycleBus`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Phase {
    Setup,
    Initialize,
    NextStep,
    LastStep,
    /// Nested event raised while a NextStep is being handled.
    Release,
}

impl Phase {
    pub const ALL: [Phase; 5] = [
        Phase::Setup,
        Phase::Initialize,
        Phase::NextStep,
        Phase::LastStep,
        Phase::Release,
    ];

    /// Whether listeners of this phase are visited last-registered first.
    pub const fn reversed(self) -> bool {
        match self {
            Phase::Setup | Phase::Initialize | Phase::NextStep => true,
            Phase::LastStep | Phase::Release => false,
        }
    }

    const fn slot(self) -> usize {
        match self {
            Phase::Setup => 0,
            Phase::Initialize => 1,
            Phase::NextStep => 2,
            Phase::LastStep => 3,
            Phase::Release => 4,
        }
    }
}

/// Ordered listener lists, one per phase.
///
/// Listeners are lightweight handles (typically an enum naming a subsystem);
/// the caller resolves a handle to the subsystem it owns when dispatching.
#[derive(Clone, Debug)]
pub struct LifecycleBus<L> {
    lists: [Vec<L>; 5],
}

impl<L: Copy + PartialEq> Default for LifecycleBus<L> {
    fn default() -> Self {
        Self::new()
    }
}

impl<L: Copy + PartialEq> LifecycleBus<L> {
    pub fn new() -> Self {
        Self {
            lists: Default::default(),
        }
    }

    /// Append `listener` to the registration order of every phase in `phases`.
    pub fn register(&mut self, listener: L, phases: &[Phase]) {
        for phase in phases {
            let list = &mut self.lists[phase.slot()];
            if !list.contains(&listener) {
                list.push(listener);
            }
        }
    }

    pub fn clear(&mut self) {
        for list in &mut self.lists {
            list.clear();
        }
    }

    /// Listeners of `phase` in dispatch order.
    pub fn listeners(&self, phase: Phase) -> Vec<L> {
        let mut ordered = self.lists[phase.slot()].clone();
        if phase.reversed() {
            ordered.reverse();
        }
        ordered
    }

    /// Visit the listeners of `phase` in dispatch order. The first error aborts
    /// the remaining listeners and is returned.
    pub fn dispatch<E, F>(&self, phase: Phase, mut handler: F) -> Result<(), E>
    where
        F: FnMut(L) -> Result<(), E>,
    {
        for listener in self.listeners(phase) {
            handler(listener)?;
        }
        Ok(())
    }
}
