// ABOUTME: Service manager commands for restarting the local database daemon
// ABOUTME: Maps the closed RestartPolicy to the ordered commands it implies

use crate::command::CommandSpec;
use crate::config::RestartPolicy;

/// Commands for `policy`, in the order they must run. Empty for `none`.
pub fn restart_commands(manager: &str, service: &str, policy: RestartPolicy) -> Vec<CommandSpec> {
    let action = |verb: &str| CommandSpec::new(manager).arg(verb).arg(service);
    match policy {
        RestartPolicy::Restart => vec![action("restart")],
        RestartPolicy::StopStart => vec![action("stop"), action("start")],
        RestartPolicy::None => Vec::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_restart_is_single_command() {
        let commands = restart_commands("systemctl", "mariadb", RestartPolicy::Restart);
        let lines: Vec<String> = commands.iter().map(|c| c.to_string()).collect();
        assert_eq!(lines, vec!["systemctl restart mariadb"]);
    }

    #[test]
    fn test_stop_start_is_ordered() {
        let commands = restart_commands("systemctl", "mysql", RestartPolicy::StopStart);
        let lines: Vec<String> = commands.iter().map(|c| c.to_string()).collect();
        assert_eq!(lines, vec!["systemctl stop mysql", "systemctl start mysql"]);
    }

    #[test]
    fn test_none_issues_nothing() {
        assert!(restart_commands("systemctl", "mariadb", RestartPolicy::None).is_empty());
    }
}
