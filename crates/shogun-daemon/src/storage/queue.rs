//! Command queue operations.

use tracing::{debug, info};

use super::models::{Command, CommandQueue, CommandStatus};
use super::store::{Store, StoreError, read_yaml, write_yaml};
use crate::clock;

impl Store {
    /// All commands in queue order.
    pub async fn read_queue(&self) -> Result<Vec<Command>, StoreError> {
        Ok(self.load_queue().await?.queue)
    }

    /// Look up one command by id.
    pub async fn find_command(&self, id: &str) -> Result<Option<Command>, StoreError> {
        Ok(self.read_queue().await?.into_iter().find(|c| c.id == id))
    }

    /// Set the status of command `id`. Returns `false` when no such command
    /// exists.
    pub async fn update_command_status(
        &self,
        id: &str,
        status: CommandStatus,
    ) -> Result<bool, StoreError> {
        let _guard = self.queue_lock.lock().await;
        let mut queue = self.load_queue().await?;
        let Some(command) = queue.queue.iter_mut().find(|c| c.id == id) else {
            return Ok(false);
        };
        command.status = status;
        write_yaml(&self.queue_path(), &queue).await?;
        debug!(command_id = id, %status, "Command status updated");
        Ok(true)
    }

    /// Append a pending command with the next free `cmd_NNN` id.
    pub async fn enqueue_command(
        &self,
        text: &str,
        project: Option<&str>,
        priority: Option<&str>,
    ) -> Result<Command, StoreError> {
        let _guard = self.queue_lock.lock().await;
        let mut queue = self.load_queue().await?;
        let command = Command {
            id: next_command_id(&queue.queue),
            timestamp: clock::record_timestamp(),
            text: text.trim().to_string(),
            project: non_blank(project),
            priority: non_blank(priority),
            status: CommandStatus::Pending,
        };
        queue.queue.push(command.clone());
        write_yaml(&self.queue_path(), &queue).await?;
        info!(command_id = %command.id, "Command enqueued");
        Ok(command)
    }

    async fn load_queue(&self) -> Result<CommandQueue, StoreError> {
        Ok(read_yaml(&self.queue_path()).await?.unwrap_or_default())
    }
}

fn next_command_id(queue: &[Command]) -> String {
    let highest = queue
        .iter()
        .filter_map(|c| c.id.strip_prefix("cmd_")?.parse::<u32>().ok())
        .max()
        .unwrap_or(0);
    format!("cmd_{:03}", highest + 1)
}

fn non_blank(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(String::from)
}
