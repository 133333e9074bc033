use async_trait::async_trait;
use export_engine::{ExportError, InstanceRecord, Progress, Stack};
use std::path::Path;
use tokio::process::Command;
use tracing::debug;

/// Controls an instance's `docker compose` project in its base directory.
#[derive(Debug, Clone)]
pub struct ComposeStack {
    program: Vec<String>,
}

impl Default for ComposeStack {
    fn default() -> Self {
        Self::new(["docker", "compose"])
    }
}

impl ComposeStack {
    /// `program` is the command prefix; `down`/`up` arguments are appended.
    pub fn new<I, S>(program: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            program: program.into_iter().map(Into::into).collect(),
        }
    }

    async fn compose(&self, dir: &Path, args: &[&str], progress: &Progress) -> export_engine::Result<()> {
        let (program, prefix) = self
            .program
            .split_first()
            .ok_or_else(|| ExportError::Config("empty compose command".to_string()))?;

        debug!(dir = %dir.display(), program = %program, ?args, "Running compose");
        let output = Command::new(program)
            .args(prefix)
            .args(args)
            .current_dir(dir)
            .output()
            .await?;

        for line in String::from_utf8_lossy(&output.stdout)
            .lines()
            .chain(String::from_utf8_lossy(&output.stderr).lines())
        {
            progress.line(line);
        }

        if !output.status.success() {
            return Err(ExportError::component(
                "stack",
                format!("{} {} exited with {}", self.program.join(" "), args.join(" "), output.status),
            ));
        }
        Ok(())
    }
}

#[async_trait]
impl Stack for ComposeStack {
    async fn down(&self, instance: &InstanceRecord, progress: &Progress) -> export_engine::Result<()> {
        self.compose(Path::new(&instance.filesystem_base), &["down"], progress).await
    }

    async fn up(&self, instance: &InstanceRecord, progress: &Progress) -> export_engine::Result<()> {
        self.compose(Path::new(&instance.filesystem_base), &["up", "-d"], progress).await
    }
}
