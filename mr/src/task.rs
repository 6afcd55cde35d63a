use std::ops::Range;

/// Half-open index range `[start, end)` over the job input.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Slice {
    pub start: usize,
    pub end: usize,
}

impl Slice {
    pub fn new(start: usize, end: usize) -> Self {
        debug_assert!(start <= end);
        Slice { start, end }
    }

    pub fn len(&self) -> usize {
        self.end - self.start
    }

    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }

    pub fn contains(&self, index: usize) -> bool {
        index >= self.start && index < self.end
    }

    pub fn range(&self) -> Range<usize> {
        self.start..self.end
    }
}

#[derive(Debug, PartialEq, Clone, Copy)]
pub enum TaskStatus {
    NotReady,
    Init,
    Ongoing,
    Done,
    Failed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskType {
    Map,
    Reduce,
}

/// What a task works on: a slice of the input for map tasks, a partition
/// index for reduce tasks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskInput {
    Slice(Slice),
    Partition(usize),
}

/// Counters a worker reports when it finishes.
///
/// For map tasks `records_in` counts mapper calls and `records_out` the
/// intermediate pairs emitted; `groups` stays zero.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TaskStats {
    pub records_in: usize,
    pub groups: usize,
    pub records_out: usize,
}

#[derive(Debug, Clone)]
pub struct Task {
    id: usize,
    input: TaskInput,
    status: TaskStatus,
    task_type: TaskType,
    output: Option<TaskStats>,
}

impl Task {
    pub fn new_map_task(id: usize, slice: Slice) -> Task {
        Task {
            id,
            input: TaskInput::Slice(slice),
            status: TaskStatus::Init,
            task_type: TaskType::Map,
            output: None,
        }
    }

    /// Reduce tasks start out `NotReady` until the map barrier is passed.
    pub fn new_reduce_task(id: usize, partition: usize) -> Task {
        Task {
            id,
            input: TaskInput::Partition(partition),
            status: TaskStatus::NotReady,
            task_type: TaskType::Reduce,
            output: None,
        }
    }

    pub fn get_task_id(&self) -> usize {
        self.id
    }

    pub fn get_task_type(&self) -> TaskType {
        self.task_type
    }

    pub fn get_task_status(&self) -> TaskStatus {
        self.status
    }

    pub fn set_status(&mut self, status: TaskStatus) {
        self.status = status;
    }

    pub fn get_input(&self) -> TaskInput {
        self.input
    }

    pub fn get_slice(&self) -> Option<Slice> {
        match self.input {
            TaskInput::Slice(slice) => Some(slice),
            TaskInput::Partition(_) => None,
        }
    }

    pub fn get_partition(&self) -> Option<usize> {
        match self.input {
            TaskInput::Partition(p) => Some(p),
            TaskInput::Slice(_) => None,
        }
    }

    pub fn get_task_output(&self) -> Option<TaskStats> {
        self.output
    }

    pub fn set_task_output(&mut self, output: TaskStats) {
        self.output = Some(output);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_slice_bounds() {
        let slice = Slice::new(2, 5);
        assert_eq!(slice.len(), 3);
        assert!(!slice.contains(1));
        assert!(slice.contains(2));
        assert!(slice.contains(4));
        assert!(!slice.contains(5));
        assert!(Slice::new(3, 3).is_empty());
    }

    #[test]
    fn test_task_lifecycle() {
        let mut task = Task::new_reduce_task(4, 1);
        assert_eq!(task.get_task_status(), TaskStatus::NotReady);
        assert_eq!(task.get_partition(), Some(1));
        assert_eq!(task.get_slice(), None);

        task.set_status(TaskStatus::Init);
        task.set_status(TaskStatus::Done);
        task.set_task_output(TaskStats {
            records_in: 3,
            groups: 2,
            records_out: 2,
        });
        assert_eq!(task.get_task_output().unwrap().groups, 2);
    }
}
