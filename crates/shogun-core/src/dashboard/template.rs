/// Dashboard written by `shogun init` when the workspace has none.
pub const DEFAULT_TEMPLATE: &str = "\
# Dashboard
Last Updated: -

## Action Required

## In Progress

## Results
| Time | Project | Task | Result |
|------|---------|------|--------|

## Skill Candidates
";
