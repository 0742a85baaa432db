/// The scheduling policies the simulator knows how to run.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PolicyKind {
    Edf,
    EdfVd,
    Fmc,
    FmcDrop,
    HFmc,
    Red,
}

impl PolicyKind {
    pub const ALL: [PolicyKind; 6] = [
        PolicyKind::Edf,
        PolicyKind::EdfVd,
        PolicyKind::Fmc,
        PolicyKind::FmcDrop,
        PolicyKind::HFmc,
        PolicyKind::Red,
    ];

    /// CLI spelling of the policy.
    pub fn label(&self) -> &'static str {
        match self {
            PolicyKind::Edf => "edf",
            PolicyKind::EdfVd => "edf-vd",
            PolicyKind::Fmc => "fmc",
            PolicyKind::FmcDrop => "fmc-drop",
            PolicyKind::HFmc => "h-fmc",
            PolicyKind::Red => "red",
        }
    }
}
