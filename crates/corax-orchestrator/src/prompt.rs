//! Prompt construction for the reasoning loop
//!
//! Three prompts drive a session: the reasoning prompt (one structured
//! decision per iteration), the output-analysis prompt, and the final report
//! prompt. The transition message is not a prompt at all - it is rendered
//! for the human who has to approve a phase change.

use std::sync::OnceLock;

use corax_core::{
    format_execution_trace, format_todo_list, truncate_chars, Phase, SessionState, TargetIntel,
    TransitionRequest,
};
use regex::Regex;

/// Steps of trace shown to the reasoning prompt
const PROMPT_TRACE_STEPS: usize = 5;

const INFORMATIONAL_TOOLS: &str = r#"### Informational Phase Tools

1. **query_graph** (PRIMARY - always use first)
   - Query the reconnaissance graph database using natural language
   - Contains: Domains, Subdomains, IPs, Ports, Services, Technologies, Vulnerabilities, CVEs
   - This is your primary source of truth for reconnaissance data
   - Example: "What ports are open on 10.0.0.5?"
   - Example: "Show all critical vulnerabilities for this project"

2. **execute_curl** (auxiliary - for verification)
   - Make HTTP requests to verify or probe endpoints
   - Use ONLY to verify information from the graph or test specific endpoints
   - Example args: "-s -I http://target.com" (get headers)

3. **execute_naabu** (auxiliary - for verification)
   - Fast port scanner for verification
   - Use ONLY to verify ports are actually open or scan targets not in the graph
   - Example args: "-host 10.0.0.5 -p 80,443,8080 -json"
"#;

const EXPLOITATION_TOOLS: &str = r#"### Exploitation Phase Tools

All Informational tools PLUS:

4. **metasploit_console** (primary for exploitation)
   - Execute Metasploit Framework commands
   - **CRITICAL: this tool is STATELESS** - each call starts a FRESH msfconsole
   - Chain ALL related commands in ONE call using SEMICOLONS (not &&)
   - CORRECT: "use exploit/multi/http/apache_normalize_path_rce; set RHOSTS 10.0.0.5; set RPORT 443; exploit"
   - Search: "search CVE-2021-41773"
   - For reverse shell payloads you MUST set LHOST and LPORT
"#;

const POST_EXPLOITATION_TOOLS: &str = r#"### Post-Exploitation Phase Tools

All Exploitation tools PLUS session interaction:

5. **metasploit_console** (extended for post-exploitation)
   - STILL STATELESS - chain commands with semicolons
   - Sessions persist on the target, so session commands can be separate calls:
     - "sessions -l" - list active sessions
     - "sessions -c 'whoami' -i 1" - run a command on session 1
"#;

const PHASE_DEFINITIONS: &str = r#"### Phase Definitions

**INFORMATIONAL** (default starting phase)
- Purpose: gather intelligence, understand the target, verify data
- Allowed tools: query_graph (PRIMARY), execute_curl, execute_naabu

**EXPLOITATION** (requires user approval to enter)
- Purpose: actively exploit confirmed vulnerabilities
- Allowed tools: all informational tools + metasploit_console (USE THEM!)
- If the current phase is already "exploitation", use action="use_tool" with
  tool_name="metasploit_console" - do NOT request another transition

**POST-EXPLOITATION** (requires user approval to enter)
- Purpose: actions on compromised systems
- Prerequisites: an active session AND user approval
"#;

const INTENT_DETECTION: &str = r#"## Intent Detection

**Exploitation intent** - keywords: "exploit", "attack", "pwn", "run exploit"
- When the user explicitly asks to exploit a CVE or vulnerability, make ONE
  query for the target details, then request the phase transition immediately.

**Research intent** - keywords: "find", "show", "list", "scan", "enumerate"
- Query the graph database FIRST for any information need
- Use curl/naabu ONLY to verify or update existing information
- NEVER re-scan for data that already exists in the graph
"#;

const DECISION_FORMAT: &str = r#"## Your Task

Based on the context above, decide your next action. You MUST output valid JSON:

```json
{
    "thought": "Your analysis of the current situation and what needs to happen next",
    "reasoning": "Why you chose this specific action over alternatives",
    "action": "use_tool | transition_phase | complete",
    "tool_name": "query_graph | execute_curl | execute_naabu | metasploit_console",
    "tool_args": {"question": "..."} or {"args": "..."} or {"command": "..."},
    "phase_transition": {
        "to_phase": "exploitation | post_exploitation",
        "reason": "Why this transition is needed",
        "planned_actions": ["Action 1", "Action 2"],
        "risks": ["Risk 1", "Risk 2"]
    },
    "completion_reason": "Summary if action=complete",
    "updated_todo_list": [
        {"id": "existing-id-or-new", "description": "Task description", "status": "pending|in_progress|completed|blocked", "priority": "high|medium|low"}
    ]
}
```

### Action Types
- **use_tool**: execute a tool. Include tool_name and tool_args.
- **transition_phase**: request a phase change. Include the phase_transition object.
- **complete**: the task is finished. Include completion_reason.

### Tool Arguments
- query_graph: {"question": "natural language question about the graph data"}
- execute_curl: {"args": "curl arguments without the 'curl' prefix"}
- execute_naabu: {"args": "naabu arguments without the 'naabu' prefix"}
- metasploit_console: {"command": "msfconsole command to execute"}

### Important Rules
1. ALWAYS update the todo list to track progress
2. Request a phase transition ONLY when moving forward (informational to
   exploitation, exploitation to post_exploitation)
3. NEVER request a transition to the phase you are already in - it will be ignored
4. Each metasploit_console call is a fresh console: chain every related
   command in one call with semicolons
"#;

/// Tool catalog text for a phase (cumulative across phases)
pub fn phase_tools(phase: Phase) -> String {
    match phase {
        Phase::Informational => INFORMATIONAL_TOOLS.to_string(),
        Phase::Exploitation => format!("{}\n{}", INFORMATIONAL_TOOLS, EXPLOITATION_TOOLS),
        Phase::PostExploitation => format!(
            "{}\n{}\n{}",
            INFORMATIONAL_TOOLS, EXPLOITATION_TOOLS, POST_EXPLOITATION_TOOLS
        ),
    }
}

/// Build the reasoning prompt for one think iteration
pub fn build_react_prompt(state: &SessionState) -> String {
    let mut prompt = String::new();

    prompt.push_str(
        "You are Corax, an AI penetration testing assistant using the ReAct \
         (Reasoning and Acting) framework.\n\n",
    );
    prompt.push_str("## Your Operating Model\n\n");
    prompt.push_str("You work step-by-step using the Thought-Tool-Output pattern:\n");
    prompt.push_str("1. **Thought**: analyze what you know and what you need to learn\n");
    prompt.push_str("2. **Action**: select and execute the appropriate tool\n");
    prompt.push_str("3. **Observation**: analyze the tool output\n");
    prompt.push_str("4. **Reflection**: update your understanding and todo list\n\n");

    prompt.push_str(&format!("## Current Phase: {}\n\n", state.current_phase));
    prompt.push_str(PHASE_DEFINITIONS);
    prompt.push('\n');
    prompt.push_str(INTENT_DETECTION);
    prompt.push('\n');

    prompt.push_str("## Available Tools\n\n");
    prompt.push_str(&phase_tools(state.current_phase));
    prompt.push('\n');

    prompt.push_str("## Current State\n\n");
    prompt.push_str(&format!(
        "**Iteration**: {}/{}\n",
        state.current_iteration, state.max_iterations
    ));
    prompt.push_str(&format!(
        "**Original Objective**: {}\n\n",
        state.original_objective
    ));
    prompt.push_str("### Previous Execution Steps\n");
    prompt.push_str(&format_execution_trace(
        &state.execution_trace,
        PROMPT_TRACE_STEPS,
    ));
    prompt.push_str("\n\n### Current Todo List\n");
    prompt.push_str(&format_todo_list(&state.todo_list));
    prompt.push_str("\n\n### Known Target Information\n");
    prompt.push_str(&state.target_info.to_prompt_block());
    prompt.push_str("\n\n");

    prompt.push_str(DECISION_FORMAT);

    prompt
}

/// Build the analysis prompt for one tool output
///
/// Raw output is truncated to `max_chars` characters; the full text stays in
/// the execution trace.
pub fn build_analysis_prompt(
    tool_name: &str,
    tool_args: &serde_json::Value,
    tool_output: &str,
    intel: &TargetIntel,
    max_chars: usize,
) -> String {
    let mut prompt = String::new();

    prompt.push_str("Analyze the tool output and extract relevant information.\n\n");
    prompt.push_str(&format!("## Tool: {}\n", tool_name));
    prompt.push_str(&format!("## Arguments: {}\n\n", tool_args));
    prompt.push_str("## Output:\n");
    prompt.push_str(truncate_chars(tool_output, max_chars));
    prompt.push_str("\n\n## Current Target Intelligence:\n");
    prompt.push_str(&intel.to_prompt_block());
    prompt.push_str("\n\n## Your Task\n\n");
    prompt.push_str("1. Interpret what this output means for the penetration test\n");
    prompt.push_str("2. Extract any new information to add to target intelligence\n");
    prompt.push_str("3. Identify actionable findings\n\n");
    prompt.push_str("Output valid JSON:\n");
    prompt.push_str(
        r#"```json
{
    "interpretation": "What this output tells us about the target",
    "extracted_info": {
        "primary_target": "IP or hostname if discovered",
        "ports": [80, 443],
        "services": ["http", "https"],
        "technologies": ["nginx", "PHP"],
        "vulnerabilities": ["CVE-2021-41773"],
        "credentials": [],
        "sessions": []
    },
    "actionable_findings": ["Finding that requires follow-up"],
    "recommended_next_steps": ["Suggested next action"]
}
```

Only include fields in extracted_info that have new information.
"#,
    );

    prompt
}

/// Render a transition request for the human who has to approve it
///
/// Planned actions and risks appear verbatim, one bullet each; empty lists
/// get a placeholder line.
pub fn transition_message(request: &TransitionRequest) -> String {
    let planned_actions = if request.planned_actions.is_empty() {
        "- No specific actions planned".to_string()
    } else {
        request
            .planned_actions
            .iter()
            .map(|action| format!("- {}", action))
            .collect::<Vec<_>>()
            .join("\n")
    };

    let risks = if request.risks.is_empty() {
        "- No specific risks identified".to_string()
    } else {
        request
            .risks
            .iter()
            .map(|risk| format!("- {}", risk))
            .collect::<Vec<_>>()
            .join("\n")
    };

    format!(
        "## Phase Transition Request\n\n\
         I need your approval to proceed from **{}** to **{}**.\n\n\
         ### Reason\n{}\n\n\
         ### Planned Actions\n{}\n\n\
         ### Potential Risks\n{}\n\n\
         ---\n\n\
         Please respond with:\n\
         - **Approve** - Proceed with the transition\n\
         - **Modify** - Modify the plan (provide your changes)\n\
         - **Abort** - Cancel and stay in current phase\n",
        request.from_phase, request.to_phase, request.reason, planned_actions, risks
    )
}

/// Build the final report prompt from the whole session
pub fn build_report_prompt(state: &SessionState) -> String {
    let mut prompt = String::new();

    prompt.push_str("Generate a summary report of the penetration test session.\n\n");
    prompt.push_str("## Original Objective\n");
    prompt.push_str(&state.original_objective);
    prompt.push_str("\n\n## Execution Summary\n");
    prompt.push_str(&format!("- Total iterations: {}\n", state.current_iteration));
    prompt.push_str(&format!("- Final phase: {}\n", state.current_phase));
    prompt.push_str(&format!(
        "- Completion reason: {}\n",
        state.completion_reason.as_deref().unwrap_or("not specified")
    ));
    prompt.push_str("\n## Execution Trace\n");
    prompt.push_str(&format_execution_trace(
        &state.execution_trace,
        state.execution_trace.len().max(1),
    ));
    prompt.push_str("\n\n## Target Intelligence Gathered\n");
    prompt.push_str(&state.target_info.to_prompt_block());
    prompt.push_str("\n\n## Todo List Final Status\n");
    prompt.push_str(&format_todo_list(&state.todo_list));
    prompt.push_str("\n\n---\n\n");
    prompt.push_str("Generate a concise but comprehensive report including:\n");
    prompt.push_str("1. **Summary**: brief overview of what was accomplished\n");
    prompt.push_str("2. **Key Findings**: most important discoveries\n");
    prompt.push_str("3. **Vulnerabilities Found**: list with severity if known\n");
    prompt.push_str("4. **Recommendations**: next steps or remediation advice\n");
    prompt.push_str("5. **Limitations**: what could not be tested or verified\n");

    prompt
}

fn cve_regex() -> &'static Regex {
    static CVE_RE: OnceLock<Regex> = OnceLock::new();
    CVE_RE.get_or_init(|| Regex::new(r"(?i)CVE-\d{4}-\d+").unwrap())
}

/// Default metasploit command when the exploitation phase has no tool chosen
///
/// Pulls a CVE identifier out of the objective when one is present, otherwise
/// falls back to a generic exploit search.
pub fn default_exploit_command(objective: &str) -> String {
    match cve_regex().find(objective) {
        Some(cve) => format!("search {}", cve.as_str().to_uppercase()),
        None => "search type:exploit".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use corax_core::{SessionKey, TodoItem};

    fn state() -> SessionState {
        SessionState::new(
            SessionKey::new("alice", "acme", "s-01"),
            "find vulnerabilities on 10.0.0.5 and exploit CVE-2021-41773",
            30,
        )
    }

    #[test]
    fn test_phase_tools_are_cumulative() {
        let informational = phase_tools(Phase::Informational);
        assert!(informational.contains("query_graph"));
        assert!(!informational.contains("metasploit_console"));

        let exploitation = phase_tools(Phase::Exploitation);
        assert!(exploitation.contains("query_graph"));
        assert!(exploitation.contains("metasploit_console"));
        assert!(!exploitation.contains("sessions -l"));

        let post = phase_tools(Phase::PostExploitation);
        assert!(post.contains("sessions -l"));
    }

    #[test]
    fn test_react_prompt_includes_session_state() {
        let mut s = state();
        s.current_iteration = 3;
        s.todo_list.push(TodoItem::new("enumerate the web service"));

        let prompt = build_react_prompt(&s);
        assert!(prompt.contains("## Current Phase: informational"));
        assert!(prompt.contains("**Iteration**: 3/30"));
        assert!(prompt.contains("exploit CVE-2021-41773"));
        assert!(prompt.contains("enumerate the web service"));
        assert!(prompt.contains("No steps executed yet."));
        assert!(prompt.contains("Nothing known about the target yet."));
    }

    #[test]
    fn test_react_prompt_tool_catalog_follows_phase() {
        let mut s = state();
        let informational = build_react_prompt(&s);
        assert!(!informational.contains("### Exploitation Phase Tools"));

        s.commit_phase(Phase::Exploitation);
        let exploitation = build_react_prompt(&s);
        assert!(exploitation.contains("### Exploitation Phase Tools"));
    }

    #[test]
    fn test_transition_message_round_trips_lists() {
        let request = TransitionRequest::new(
            Phase::Informational,
            Phase::Exploitation,
            "confirmed path traversal on the target",
        )
        .with_planned_actions(vec![
            "search for the apache_normalize_path_rce module".to_string(),
            "run the module against 10.0.0.5:443".to_string(),
        ])
        .with_risks(vec!["service disruption on the web tier".to_string()]);

        let message = transition_message(&request);
        assert!(message.contains("from **informational** to **exploitation**"));
        assert!(message.contains("confirmed path traversal on the target"));
        for action in &request.planned_actions {
            assert!(message.contains(&format!("- {}", action)));
        }
        for risk in &request.risks {
            assert!(message.contains(&format!("- {}", risk)));
        }
        assert!(message.contains("**Approve**"));
    }

    #[test]
    fn test_transition_message_placeholders_when_empty() {
        let request = TransitionRequest::new(
            Phase::Exploitation,
            Phase::PostExploitation,
            "shell obtained",
        );
        let message = transition_message(&request);
        assert!(message.contains("- No specific actions planned"));
        assert!(message.contains("- No specific risks identified"));
    }

    #[test]
    fn test_analysis_prompt_truncates_output() {
        let long_output = "x".repeat(10_000);
        let prompt = build_analysis_prompt(
            "execute_naabu",
            &serde_json::json!({"args": "-host 10.0.0.5"}),
            &long_output,
            &TargetIntel::default(),
            100,
        );
        assert!(prompt.contains(&"x".repeat(100)));
        assert!(!prompt.contains(&"x".repeat(101)));
        assert!(prompt.contains("## Tool: execute_naabu"));
    }

    #[test]
    fn test_report_prompt_covers_summary_fields() {
        let mut s = state();
        s.current_iteration = 7;
        s.completion_reason = Some("objective satisfied".to_string());

        let prompt = build_report_prompt(&s);
        assert!(prompt.contains("- Total iterations: 7"));
        assert!(prompt.contains("- Final phase: informational"));
        assert!(prompt.contains("objective satisfied"));
        assert!(prompt.contains("**Limitations**"));
    }

    #[test]
    fn test_default_exploit_command_extracts_cve() {
        assert_eq!(
            default_exploit_command("exploit cve-2021-41773 on the apache host"),
            "search CVE-2021-41773"
        );
        assert_eq!(
            default_exploit_command("pop the box and grab a shell"),
            "search type:exploit"
        );
    }
}
