use std::fs;
use std::io::Write;
use std::process::{Command, Output, Stdio};

fn shell() -> Command {
	Command::new(env!("CARGO_BIN_EXE_myshell"))
}

fn run_with(mut cmd: Command, script: &str) -> Output {
	let mut child = cmd
		.stdin(Stdio::piped())
		.stdout(Stdio::piped())
		.stderr(Stdio::piped())
		.spawn()
		.expect("spawn shell");
	child
		.stdin
		.as_mut()
		.expect("stdin")
		.write_all(script.as_bytes())
		.expect("write script");
	child.wait_with_output().expect("wait for shell")
}

fn run_script(script: &str) -> Output {
	run_with(shell(), script)
}

fn stdout_str(out: &Output) -> String {
	String::from_utf8_lossy(&out.stdout).into_owned()
}

fn stderr_str(out: &Output) -> String {
	String::from_utf8_lossy(&out.stderr).into_owned()
}

#[test]
fn prompt_is_shown() {
	let out = run_script("");
	assert!(stdout_str(&out).contains("myshell> "));
	assert_eq!(out.status.code(), Some(0));
}

#[test]
fn echo_joins_arguments() {
	let out = run_script("echo hello world\n");
	assert!(stdout_str(&out).contains("hello world\n"));
	assert_eq!(out.status.code(), Some(0));
}

#[test]
fn double_quotes_process_escapes() {
	let out = run_script("echo \"a\\tb\"\n");
	assert!(stdout_str(&out).contains("a\tb\n"));
}

#[test]
fn single_quotes_are_literal() {
	let out = run_script("echo 'a\\tb'\n");
	assert!(stdout_str(&out).contains("a\\tb\n"));
}

#[test]
fn quotes_join_into_one_token() {
	let out = run_script("echo a\"b c\"d\n");
	assert!(stdout_str(&out).contains("ab cd\n"));
}

#[test]
fn variable_expansion_from_environment() {
	let mut cmd = shell();
	cmd.env("MYSHELL_T_HOME", "/tmp");
	let out = run_with(cmd, "echo $MYSHELL_T_HOME/x\n");
	assert!(stdout_str(&out).contains("/tmp/x\n"));
}

#[test]
fn unset_variable_expands_to_nothing() {
	let mut cmd = shell();
	cmd.env_remove("MYSHELL_T_GONE");
	let out = run_with(cmd, "echo \"x${MYSHELL_T_GONE}y\"\n");
	assert!(stdout_str(&out).contains("xy\n"));
}

#[test]
fn operators_need_whitespace() {
	let out = run_script("echo a>b\n");
	assert!(stdout_str(&out).contains("a>b\n"));
}

#[test]
fn output_redirection_creates_file() {
	let dir = tempfile::tempdir().unwrap();
	let path = dir.path().join("out.txt");
	let path = path.to_str().unwrap();
	let script = format!("echo data > {}\ncat {}\n", path, path);
	let out = run_script(&script);
	assert!(stdout_str(&out).contains("data\n"));
	assert_eq!(fs::read_to_string(path).unwrap(), "data\n");
}

#[test]
fn append_redirection_keeps_previous_content() {
	let dir = tempfile::tempdir().unwrap();
	let path = dir.path().join("log.txt");
	let path = path.to_str().unwrap();
	let script = format!("echo one > {}\necho two >> {}\n", path, path);
	run_script(&script);
	assert_eq!(fs::read_to_string(path).unwrap(), "one\ntwo\n");
}

#[test]
fn truncating_redirection_discards_previous_content() {
	let dir = tempfile::tempdir().unwrap();
	let path = dir.path().join("out.txt");
	let path = path.to_str().unwrap();
	let script = format!("echo one > {}\necho two > {}\n", path, path);
	run_script(&script);
	assert_eq!(fs::read_to_string(path).unwrap(), "two\n");
}

#[test]
fn input_redirection_feeds_builtin() {
	let dir = tempfile::tempdir().unwrap();
	let path = dir.path().join("in.txt");
	fs::write(&path, "from file\n").unwrap();
	let script = format!("cat < {}\n", path.to_str().unwrap());
	let out = run_script(&script);
	assert!(stdout_str(&out).contains("from file\n"));
}

#[test]
fn missing_input_file_is_reported() {
	let out = run_script("cat < /no/such/file/here\necho still alive\n");
	assert!(stderr_str(&out).contains("/no/such/file/here"));
	assert!(stdout_str(&out).contains("still alive\n"));
}

#[test]
fn pipeline_connects_stdout_to_stdin() {
	let out = run_script("echo abc | cat\n");
	assert!(stdout_str(&out).contains("abc\n"));
}

#[test]
fn three_stage_pipeline_sees_eof() {
	// Hangs forever if any write end of any pipe is left open.
	let out = run_script("echo abc | cat | cat\n");
	assert!(stdout_str(&out).contains("abc\n"));
}

#[test]
fn syntax_errors_do_not_kill_the_shell() {
	let out = run_script("echo |\necho ok\n");
	assert!(stderr_str(&out).contains("syntax error near unexpected token '|'"));
	assert!(stdout_str(&out).contains("ok\n"));
}

#[test]
fn misplaced_ampersand_is_rejected() {
	let out = run_script("echo a & b\n");
	assert!(stderr_str(&out).contains("& must be at end"));
}

#[test]
fn duplicate_redirections_are_rejected() {
	let out = run_script("cat < a < b\n");
	assert!(stderr_str(&out).contains("multiple input redirections"));
}

#[test]
fn unterminated_quote_is_reported() {
	let out = run_script("echo 'abc\necho ok\n");
	assert!(stderr_str(&out).contains("unterminated single quote"));
	assert!(stdout_str(&out).contains("ok\n"));
}

#[test]
fn unknown_command_reports_not_found() {
	let out = run_script("myshell_no_such_binary_417\necho next\n");
	assert!(stderr_str(&out).contains("command not found"));
	assert!(stdout_str(&out).contains("next\n"));
}

#[test]
fn background_launch_prints_job_line() {
	let out = run_script("echo marker &\n");
	let stdout = stdout_str(&out);
	assert!(stdout.contains("[1] "));
	assert!(stdout.contains("marker"));
}

#[test]
fn jobs_with_no_jobs_prints_nothing() {
	let out = run_script("jobs\n");
	assert!(!stdout_str(&out).contains('['));
}

#[test]
fn exit_sets_shell_status() {
	let out = run_script("exit 3\n");
	assert_eq!(out.status.code(), Some(3));
	let out = run_script("exit\n");
	assert_eq!(out.status.code(), Some(0));
}

#[test]
fn exit_skips_rest_of_session() {
	let out = run_script("exit\necho never\n");
	assert!(!stdout_str(&out).contains("never"));
}

#[test]
fn cd_changes_directory_for_pwd() {
	let dir = tempfile::tempdir().unwrap();
	let expected = fs::canonicalize(dir.path()).unwrap();
	let script = format!("cd {}\npwd\n", dir.path().to_str().unwrap());
	let out = run_script(&script);
	assert!(stdout_str(&out).contains(expected.to_str().unwrap()));
}

#[test]
fn cd_to_missing_directory_fails() {
	let out = run_script("cd /no/such/dir/417\necho after\n");
	assert!(stderr_str(&out).contains("cd"));
	assert!(stdout_str(&out).contains("after\n"));
}

#[test]
fn export_makes_variable_visible_to_expansion() {
	let out = run_script("export MYVAR=hello\necho $MYVAR\n");
	assert!(stdout_str(&out).contains("hello\n"));
}

#[test]
fn unset_removes_variable() {
	let mut cmd = shell();
	cmd.env("MYSHELL_T_UNSET", "xx");
	let out = run_with(cmd, "unset MYSHELL_T_UNSET\necho \"q${MYSHELL_T_UNSET}q\"\n");
	assert!(stdout_str(&out).contains("qq\n"));
}

#[test]
fn history_lists_numbered_commands() {
	let out = run_script("echo one\nhistory\n");
	let stdout = stdout_str(&out);
	assert!(stdout.contains("    1  echo one"));
	assert!(stdout.contains("    2  history"));
}

#[test]
fn history_suppresses_consecutive_duplicates() {
	let out = run_script("echo one\necho one\nhistory\n");
	let stdout = stdout_str(&out);
	assert!(stdout.contains("    2  history"));
	assert!(!stdout.contains("    3  "));
}

#[test]
fn mkdir_touch_ls_roundtrip() {
	let dir = tempfile::tempdir().unwrap();
	let base = dir.path().to_str().unwrap();
	let script = format!("mkdir {}/sub\ntouch {}/plain\nls {}\n", base, base, base);
	let out = run_script(&script);
	let stdout = stdout_str(&out);
	assert!(stdout.contains("plain\n"));
	// directories render in ANSI blue
	assert!(stdout.contains("\x1b[34msub\x1b[0m\n"));
	assert!(dir.path().join("sub").is_dir());
	assert!(dir.path().join("plain").is_file());
}

#[test]
fn ls_hides_dotfiles_without_dash_a() {
	let dir = tempfile::tempdir().unwrap();
	fs::write(dir.path().join(".hidden"), "").unwrap();
	fs::write(dir.path().join("shown"), "").unwrap();
	let base = dir.path().to_str().unwrap();
	let out = run_script(&format!("ls {}\n", base));
	let stdout = stdout_str(&out);
	assert!(stdout.contains("shown"));
	assert!(!stdout.contains(".hidden"));
	let out = run_script(&format!("ls -a {}\n", base));
	assert!(stdout_str(&out).contains(".hidden"));
}

#[test]
fn rm_refuses_directory_without_recursive() {
	let dir = tempfile::tempdir().unwrap();
	let sub = dir.path().join("sub");
	fs::create_dir(&sub).unwrap();
	let out = run_script(&format!("rm {}\n", sub.to_str().unwrap()));
	assert!(stderr_str(&out).contains("is a directory"));
	assert!(sub.is_dir());
}

#[test]
fn rm_recursive_removes_tree() {
	let dir = tempfile::tempdir().unwrap();
	let sub = dir.path().join("sub");
	fs::create_dir_all(sub.join("nested")).unwrap();
	fs::write(sub.join("nested").join("f"), "x").unwrap();
	fs::write(sub.join("g"), "y").unwrap();
	run_script(&format!("rm -r {}\n", sub.to_str().unwrap()));
	assert!(!sub.exists());
}

#[test]
fn rmdir_removes_empty_directory() {
	let dir = tempfile::tempdir().unwrap();
	let sub = dir.path().join("empty");
	fs::create_dir(&sub).unwrap();
	run_script(&format!("rmdir {}\n", sub.to_str().unwrap()));
	assert!(!sub.exists());
}

#[test]
fn pipeline_with_redirected_output() {
	let dir = tempfile::tempdir().unwrap();
	let path = dir.path().join("piped.txt");
	let path = path.to_str().unwrap();
	let script = format!("echo through | cat > {}\n", path);
	run_script(&script);
	assert_eq!(fs::read_to_string(path).unwrap(), "through\n");
}
