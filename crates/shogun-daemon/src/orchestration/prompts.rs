//! User prompts sent to each role and the dashboard lines built from
//! results.

use std::fmt::Write;

use crate::storage::{Assignment, Command, SkillCandidate};

/// Dispatch summaries cut descriptions to this many characters.
const SUMMARY_DESCRIPTION_CHARS: usize = 20;

pub fn commander_prompt(user_input: &str, project: Option<&str>) -> String {
    format!(
        "Instruction from the lord: {user_input}\nProject: {}",
        project.filter(|p| !p.trim().is_empty()).unwrap_or("unspecified")
    )
}

pub fn steward_prompt(command: &Command, projects_registry: &str, laborer_count: usize) -> String {
    let id = &command.id;
    let mut prompt = format!(
        "The commander has sent the following instruction. Decompose it and assign it to laborers.\n\
         \n\
         Command ID: {id}\n\
         Command: {}\n\
         Project: {}\n\
         Priority: {}\n\n",
        command.text,
        command.project.as_deref().unwrap_or("(unspecified)"),
        command.priority.as_deref().unwrap_or("medium"),
    );
    if !projects_registry.trim().is_empty() {
        prompt.push_str(projects_registry.trim_end());
        prompt.push_str("\n\n");
    }
    let _ = write!(
        prompt,
        "Based on the above, assign the work to laborers 1 to {laborer_count}.\n\
         IMPORTANT: spread every divisible piece of work across as many laborers as possible \
         so it runs in parallel. Do not settle for a single laborer; maximise parallelism.\n\
         \n\
         Reply only with JSON in the following format, with no explanation or markdown:\n\
         {{\"assignments\": [{{\"ashigaru\": 1, \"task_id\": \"{id}_1\", \"parent_cmd\": \"{id}\", \
         \"description\": \"...\", \"target_path\": \"...\"}}, ...]}}"
    );
    prompt
}

pub fn laborer_prompt(task_text: &str, task_id: &str) -> String {
    format!(
        "Carry out the following task and report the result. Always state whether there is a \
         skill candidate.\n\
         \n\
         {}\n\
         \n\
         Reply only with JSON in the following format, with no explanation or markdown:\n\
         {{\"task_id\": \"{task_id}\", \"status\": \"done\", \"result\": \"(summary of the result)\", \
         \"skill_candidate_found\": false, \"skill_candidate_name\": null, \
         \"skill_candidate_description\": null, \"skill_candidate_reason\": null}}\n\
         When skill_candidate_found is true, fill in the name, description and reason.",
        task_text.trim_end()
    )
}

/// One line for the in-progress section naming every dispatched task.
pub fn dispatch_summary(command_id: &str, assignments: &[Assignment]) -> String {
    let tasks: Vec<String> = assignments
        .iter()
        .map(|a| format!("laborer {}: {}", a.laborer, truncate(&a.description)))
        .collect();
    format!("- {command_id}: tasks dispatched ({})", tasks.join(", "))
}

pub fn skill_line(name: &str, candidate: &SkillCandidate) -> String {
    format!(
        "- **{name}**: {} (reason: {})",
        candidate.description.as_deref().unwrap_or_default(),
        candidate.reason.as_deref().unwrap_or_default()
    )
}

pub fn action_required_line(name: &str) -> String {
    format!("- Skill candidate: **{name}** [awaiting approval]")
}

fn truncate(text: &str) -> String {
    if text.chars().count() > SUMMARY_DESCRIPTION_CHARS {
        let head: String = text.chars().take(SUMMARY_DESCRIPTION_CHARS).collect();
        format!("{head}…")
    } else {
        text.to_string()
    }
}
