//! Per-laborer task and report records, aggregate status and the project
//! registry.

use std::collections::BTreeMap;

use shogun_core::Role;

use super::models::{AgentStatus, Assignment, MasterStatus, ReportRecord, TaskFile, TaskRecord};
use super::store::{Store, StoreError, read_optional, read_yaml, write_atomic, write_yaml};

impl Store {
    // =========================================================================
    // Task records
    // =========================================================================

    pub async fn write_task_record(
        &self,
        laborer: usize,
        task: &TaskRecord,
    ) -> Result<(), StoreError> {
        self.check_laborer(laborer)?;
        let file = TaskFile { task: task.clone() };
        write_yaml(&self.task_path(laborer), &file).await
    }

    pub async fn read_task_record(&self, laborer: usize) -> Result<Option<TaskRecord>, StoreError> {
        self.check_laborer(laborer)?;
        Ok(read_yaml::<TaskFile>(&self.task_path(laborer))
            .await?
            .map(|f| f.task))
    }

    /// Raw text of a laborer's task file, as handed to the laborer.
    pub async fn read_task_text(&self, laborer: usize) -> Result<Option<String>, StoreError> {
        self.check_laborer(laborer)?;
        read_optional(&self.task_path(laborer)).await
    }

    // =========================================================================
    // Report records
    // =========================================================================

    pub async fn write_report_record(
        &self,
        laborer: usize,
        report: &ReportRecord,
    ) -> Result<(), StoreError> {
        self.check_laborer(laborer)?;
        write_yaml(&self.report_path(laborer), report).await
    }

    pub async fn read_report_record(
        &self,
        laborer: usize,
    ) -> Result<Option<ReportRecord>, StoreError> {
        self.check_laborer(laborer)?;
        read_yaml(&self.report_path(laborer)).await
    }

    // =========================================================================
    // Aggregate status
    // =========================================================================

    /// Overwrite the aggregate status snapshot.
    ///
    /// The steward is shown working while the command is `in_progress`;
    /// every resolved assignment marks its laborer with the task id.
    pub async fn write_aggregate_status(
        &self,
        timestamp: &str,
        command_id: &str,
        status: &str,
        text: Option<&str>,
        assignments: Option<&[Assignment]>,
    ) -> Result<(), StoreError> {
        let mut agents = BTreeMap::new();
        agents.insert(
            Role::Steward.to_string(),
            AgentStatus {
                status: if status == "in_progress" { "working" } else { "idle" }.to_string(),
                current_task: Some(command_id.to_string()),
                current_subtasks: assignments.map(<[Assignment]>::len),
                last_action: Some(format!("{command_id} {status}")),
            },
        );
        for assignment in assignments.unwrap_or_default() {
            agents.insert(
                Role::Laborer(assignment.laborer).to_string(),
                AgentStatus {
                    status: status.to_string(),
                    current_task: Some(assignment.task_id.clone()),
                    current_subtasks: None,
                    last_action: None,
                },
            );
        }

        let snapshot = MasterStatus {
            last_updated: timestamp.to_string(),
            current_task: command_id.to_string(),
            task_status: status.to_string(),
            task_description: text.map(String::from),
            agents,
        };
        write_yaml(&self.status_path(), &snapshot).await
    }

    pub async fn read_aggregate_status(&self) -> Result<Option<MasterStatus>, StoreError> {
        read_yaml(&self.status_path()).await
    }

    // =========================================================================
    // Shared document
    // =========================================================================

    /// Current dashboard text; empty when the document does not exist yet.
    pub async fn read_shared_document(&self) -> Result<String, StoreError> {
        Ok(read_optional(&self.document_path())
            .await?
            .unwrap_or_default())
    }

    /// Overwrite the whole dashboard.
    pub async fn write_shared_document(&self, text: &str) -> Result<(), StoreError> {
        let _guard = self.document_lock.lock().await;
        write_atomic(&self.document_path(), text).await
    }

    /// Project registry text, passed verbatim to the steward.
    pub async fn read_projects_registry(&self) -> Result<String, StoreError> {
        Ok(read_optional(&self.projects_path())
            .await?
            .unwrap_or_default())
    }
}
