//! # Cucumber World
//!
//! One [`GrpcWorld`] is created per scenario. Every step, whatever its keyword, is forwarded
//! to [`GrpcSteps::run_step`] with its doc string, so feature files use the library
//! vocabulary as is.
use cucumber::gherkin::Step;
use cucumber::{World, given, then, when};
use grpc_steps::{GrpcSteps, ScenarioState};
use std::sync::OnceLock;

static STEPS: OnceLock<GrpcSteps> = OnceLock::new();

/// Sets the step definitions shared by every scenario of the run. They can only be set once.
pub fn install(steps: GrpcSteps) -> anyhow::Result<()> {
    STEPS
        .set(steps)
        .map_err(|_| anyhow::anyhow!("The gRPC step definitions are already installed"))
}

#[derive(Debug, World)]
#[world(init = Self::new)]
pub struct GrpcWorld {
    steps: Option<GrpcSteps>,
    state: ScenarioState,
}

impl GrpcWorld {
    fn new() -> Self {
        Self {
            steps: STEPS.get().cloned(),
            state: ScenarioState::new(),
        }
    }

    async fn run(&mut self, step: &Step) -> anyhow::Result<()> {
        let steps = self
            .steps
            .as_ref()
            .ok_or_else(|| anyhow::anyhow!("No gRPC services were registered"))?;

        steps
            .run_step(&mut self.state, &step.value, step.docstring.as_deref())
            .await?;

        Ok(())
    }
}

#[given(regex = r"^.+$")]
async fn given_step(world: &mut GrpcWorld, step: &Step) -> anyhow::Result<()> {
    world.run(step).await
}

#[when(regex = r"^.+$")]
async fn when_step(world: &mut GrpcWorld, step: &Step) -> anyhow::Result<()> {
    world.run(step).await
}

#[then(regex = r"^.+$")]
async fn then_step(world: &mut GrpcWorld, step: &Step) -> anyhow::Result<()> {
    world.run(step).await
}
