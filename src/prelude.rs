pub(crate) use ghostflow_core::prelude::*;
