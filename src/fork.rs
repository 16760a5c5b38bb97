/// Protocol versions. Each fork owns an immutable dispatch table and gas
/// schedule, built once by [`crate::evm::Evm::new`]; a fork may add, remove,
/// or re-cost operations relative to its predecessor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Fork {
    Frontier,
    Homestead,
    TangerineWhistle,
    SpuriousDragon,
    Byzantium,
    Constantinople,
    Istanbul,
    Berlin,
    London,
    Shanghai,
    Cancun,
}

impl Fork {
    pub fn latest() -> Self {
        Fork::Cancun
    }

    pub fn at_least(&self, other: Fork) -> bool {
        *self >= other
    }
}

impl std::fmt::Display for Fork {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Fork::Frontier => "frontier",
            Fork::Homestead => "homestead",
            Fork::TangerineWhistle => "tangerine-whistle",
            Fork::SpuriousDragon => "spurious-dragon",
            Fork::Byzantium => "byzantium",
            Fork::Constantinople => "constantinople",
            Fork::Istanbul => "istanbul",
            Fork::Berlin => "berlin",
            Fork::London => "london",
            Fork::Shanghai => "shanghai",
            Fork::Cancun => "cancun",
        };
        f.write_str(name)
    }
}
