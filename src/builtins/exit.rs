use async_trait::async_trait;

use super::{BuiltinCommand, Flow};

#[derive(Default)]
pub struct Exit;

#[async_trait]
impl BuiltinCommand for Exit {
    fn name(&self) -> &'static str {
        "exit"
    }

    async fn execute(&self, args: &[&str]) -> Flow {
        trace!("executing exit builtin: {args:?}");
        Flow::Exit
    }
}
