//! Shared building blocks of the ghostflow runtime: a common prelude and the one-shot
//! [`util::Future`]/[`util::Promise`] pair used to compose asynchronous work.
pub mod prelude;
pub mod util;
