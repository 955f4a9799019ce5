use std::cell::UnsafeCell;
use std::fmt;
use std::sync::atomic::{AtomicI32, AtomicU8, Ordering};

use nix::unistd::Pid;

pub const MAX_JOBS: usize = 100;

const FREE: u8 = 0;
const RUNNING: u8 = 1;
const STOPPED: u8 = 2;
const DONE: u8 = 3;

#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum JobStatus {
	Running,
	Stopped,
	Done,
}

impl JobStatus {
	fn to_word(self) -> u8 {
		match self {
			JobStatus::Running => RUNNING,
			JobStatus::Stopped => STOPPED,
			JobStatus::Done => DONE,
		}
	}
}

impl fmt::Display for JobStatus {
	fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
		match *self {
			JobStatus::Running => write!(f, "Running"),
			JobStatus::Stopped => write!(f, "Stopped"),
			JobStatus::Done => write!(f, "Done"),
		}
	}
}

// Snapshot of one table slot, taken for display. Owns its command text.
#[derive(Debug, Clone)]
pub struct Job {
	pub id: i32,
	pub pgid: Pid,
	pub status: JobStatus,
	pub command: String,
}

#[derive(Debug, PartialEq, Eq)]
pub struct TableFull;

impl fmt::Display for TableFull {
	fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
		write!(f, "job table full")
	}
}

// One table slot. Everything the SIGCHLD handler writes is a single
// atomic word, so a concurrent reader sees either the old or the new
// value of a field, never a torn one. The command bytes live on the
// heap with no length cap and are mutated exactly once per occupancy,
// before the slot is published through the release-store of `id`; a
// handler interrupting that window sees `id == 0` and skips the slot.
// Retiring touches only the atomics, so the bytes stay stable for the
// whole time a handler could read them. Slots are retired (and reused)
// only from the main thread.
struct Slot {
	id: AtomicI32,
	pgid: AtomicI32,
	status: AtomicU8,
	cmd: UnsafeCell<Vec<u8>>,
}

unsafe impl Sync for Slot {}

impl Slot {
	const EMPTY: Slot = Slot {
		id: AtomicI32::new(0),
		pgid: AtomicI32::new(0),
		status: AtomicU8::new(FREE),
		cmd: UnsafeCell::new(Vec::new()),
	};
}

static TABLE: [Slot; MAX_JOBS] = [Slot::EMPTY; MAX_JOBS];
static NEXT_JOB_ID: AtomicI32 = AtomicI32::new(1);

fn snapshot(slot: &Slot, id: i32) -> Job {
	let bytes = unsafe { &(&*slot.cmd.get())[..] };
	let status = match slot.status.load(Ordering::Relaxed) {
		RUNNING => JobStatus::Running,
		STOPPED => JobStatus::Stopped,
		_ => JobStatus::Done,
	};
	Job {
		id,
		pgid: Pid::from_raw(slot.pgid.load(Ordering::Relaxed)),
		status,
		command: String::from_utf8_lossy(bytes).into_owned(),
	}
}

fn retire(slot: &Slot) {
	// The command bytes are left alone; the next add() rewrites them
	// while the slot is still unpublished.
	slot.id.store(0, Ordering::Release);
	slot.pgid.store(0, Ordering::Relaxed);
	slot.status.store(FREE, Ordering::Relaxed);
}

pub fn add(pgid: Pid, command: &str, status: JobStatus) -> Result<i32, TableFull> {
	for slot in TABLE.iter() {
		if slot.id.load(Ordering::Acquire) != 0 {
			continue;
		}
		unsafe {
			let cmd = &mut *slot.cmd.get();
			cmd.clear();
			cmd.extend_from_slice(command.as_bytes());
		}
		slot.pgid.store(pgid.as_raw(), Ordering::Relaxed);
		slot.status.store(status.to_word(), Ordering::Relaxed);
		let id = NEXT_JOB_ID.fetch_add(1, Ordering::Relaxed);
		slot.id.store(id, Ordering::Release);
		return Ok(id);
	}
	Err(TableFull)
}

pub fn find(id: i32) -> Option<Job> {
	if id == 0 {
		return None;
	}
	for slot in TABLE.iter() {
		if slot.id.load(Ordering::Acquire) == id {
			return Some(snapshot(slot, id));
		}
	}
	None
}

pub fn find_by_pgid(pgid: Pid) -> Option<Job> {
	for slot in TABLE.iter() {
		let id = slot.id.load(Ordering::Acquire);
		if id != 0 && slot.pgid.load(Ordering::Relaxed) == pgid.as_raw() {
			return Some(snapshot(slot, id));
		}
	}
	None
}

pub fn update_status(id: i32, status: JobStatus) {
	if id == 0 {
		return;
	}
	for slot in TABLE.iter() {
		if slot.id.load(Ordering::Acquire) == id {
			slot.status.store(status.to_word(), Ordering::Relaxed);
			return;
		}
	}
}

// Async-signal-safe: touches nothing but the slot atomics. Returns the
// job id when a slot matched.
pub fn update_status_by_pgid(pgid: Pid, status: JobStatus) -> Option<i32> {
	for slot in TABLE.iter() {
		let id = slot.id.load(Ordering::Acquire);
		if id != 0 && slot.pgid.load(Ordering::Relaxed) == pgid.as_raw() {
			slot.status.store(status.to_word(), Ordering::Relaxed);
			return Some(id);
		}
	}
	None
}

// Async-signal-safe: hands the command bytes of `id` to `f` without
// allocating or copying. The bytes are stable for as long as the slot
// stays published (see `Slot`).
pub fn with_command<F: FnOnce(&[u8])>(id: i32, f: F) {
	if id == 0 {
		return;
	}
	for slot in TABLE.iter() {
		if slot.id.load(Ordering::Acquire) == id {
			let bytes = unsafe { &(&*slot.cmd.get())[..] };
			f(bytes);
			return;
		}
	}
}

pub fn remove(id: i32) {
	if id == 0 {
		return;
	}
	for slot in TABLE.iter() {
		if slot.id.load(Ordering::Acquire) == id {
			retire(slot);
			return;
		}
	}
}

pub fn list_active() -> Vec<Job> {
	let mut jobs = vec![];
	for slot in TABLE.iter() {
		let id = slot.id.load(Ordering::Acquire);
		if id != 0 && slot.status.load(Ordering::Relaxed) != DONE {
			jobs.push(snapshot(slot, id));
		}
	}
	jobs
}

// Main-thread only; runs before each prompt so that `jobs` can still
// show an entry that finished a moment ago.
pub fn sweep_done() {
	for slot in TABLE.iter() {
		if slot.id.load(Ordering::Acquire) != 0 && slot.status.load(Ordering::Relaxed) == DONE {
			retire(slot);
		}
	}
}
