//! Riccati recursion: backward factorization and forward expansion

pub mod factorization;
pub mod factorizer;
pub mod lqr_policy;
pub mod recursion;

pub use factorization::SplitRiccatiFactorization;
pub use factorizer::RiccatiFactorizer;
pub use lqr_policy::LqrPolicy;
pub use recursion::RiccatiRecursion;
