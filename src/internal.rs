mod dispatcher;
mod registry;

pub(crate) use dispatcher::Dispatcher;
pub(crate) use registry::Registry;
