use std::{
    thread,
    sync::{
        Arc, Mutex,
        atomic::{AtomicBool, Ordering},
    },
    time::{Duration, Instant},
};
use threadpool::ThreadPool;


/// A job returns how long to wait before it runs again.
pub type FnTask = dyn Fn() -> Duration + Send + Sync + 'static;


pub struct Task {
    name: &'static str,
    job: Arc<FnTask>,
    next_time: Instant,
    running: bool,
}

impl Task {
    pub fn new<F>(name: &'static str, job: F, first_delay: Duration) -> Self where
        F: Fn() -> Duration + Send + Sync + 'static {

        Task {
            name,
            job: Arc::new(job),
            next_time: Instant::now() + first_delay,
            running: false,
        }
    }

    fn ready(&self, now: Instant) -> bool {
        !self.running && now >= self.next_time
    }

    fn finish_job(&mut self, delay: Duration) {
        self.next_time = Instant::now() + delay;
        self.running = false;
    }
}


pub struct TaskSchedulerBuilder {
    tasks: Vec<Arc<Mutex<Task>>>,
    n_workers: usize,
    period_resolution: Duration,
}

impl TaskSchedulerBuilder {
    pub fn new() -> Self {
        TaskSchedulerBuilder {
            tasks: Vec::new(),
            n_workers: 2,
            period_resolution: Duration::new(1, 0),
        }
    }

    pub fn n_workers(mut self, cnt: usize) -> Self {
        self.n_workers = cnt.max(1);
        self
    }

    pub fn period_resolution(mut self, period: Duration) -> Self {
        self.period_resolution = period;
        self
    }

    pub fn add_task(&mut self, task: Task) {
        self.tasks.push(Arc::new(Mutex::new(task)));
    }

    pub fn build(self) -> TaskScheduler {
        TaskScheduler::new(self)
    }
}


pub struct TaskScheduler {
    scheduler: thread::JoinHandle<()>,
    running: Arc<AtomicBool>,
}

impl TaskScheduler {
    fn new(builder: TaskSchedulerBuilder) -> Self {
        let tasks = builder.tasks;
        let n_workers = builder.n_workers;
        let period_resolution = builder.period_resolution;

        let running = Arc::new(AtomicBool::new(true));
        let t_running = running.clone();

        let scheduler_job = move || {
            let pool = ThreadPool::new(n_workers);

            while t_running.load(Ordering::SeqCst) {
                let now = Instant::now();

                for m_task in &tasks {
                    let mut task = match m_task.lock() {
                        Ok(task) => task,
                        Err(_) => continue,
                    };

                    if task.ready(now) {
                        task.running = true;

                        let job = task.job.clone();
                        let name = task.name;
                        let t_task = m_task.clone();

                        pool.execute(move || {
                            debug!("Run task {}", name);
                            let delay = job();

                            if let Ok(mut task) = t_task.lock() {
                                task.finish_job(delay);
                            }
                        });
                    }
                }

                thread::sleep(period_resolution);
            }

            pool.join();
        };

        TaskScheduler {
            scheduler: thread::spawn(scheduler_job),
            running,
        }
    }

    /// Stops scheduling and waits for running jobs to finish.
    pub fn join(self) {
        if !self.running.swap(false, Ordering::SeqCst) {
            return;
        }

        if self.scheduler.join().is_err() {
            error!("Task scheduler thread panicked");
        }
    }
}


#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    #[test]
    fn tasks_repeat_until_join() {
        let count = Arc::new(AtomicUsize::new(0));
        let t_count = count.clone();

        let mut builder = TaskSchedulerBuilder::new()
            .n_workers(1)
            .period_resolution(Duration::from_millis(2));
        builder.add_task(Task::new("count", move || {
            t_count.fetch_add(1, Ordering::SeqCst);
            Duration::from_millis(5)
        }, Duration::from_millis(0)));

        let scheduler = builder.build();
        thread::sleep(Duration::from_millis(200));
        scheduler.join();

        let runs = count.load(Ordering::SeqCst);
        assert!(runs >= 2, "ran {} time(s)", runs);

        thread::sleep(Duration::from_millis(30));
        assert_eq!(count.load(Ordering::SeqCst), runs);
    }

    #[test]
    fn delayed_task_waits() {
        let count = Arc::new(AtomicUsize::new(0));
        let t_count = count.clone();

        let mut builder = TaskSchedulerBuilder::new()
            .period_resolution(Duration::from_millis(2));
        builder.add_task(Task::new("late", move || {
            t_count.fetch_add(1, Ordering::SeqCst);
            Duration::from_secs(60)
        }, Duration::from_secs(60)));

        let scheduler = builder.build();
        thread::sleep(Duration::from_millis(30));
        scheduler.join();

        assert_eq!(count.load(Ordering::SeqCst), 0);
    }
}
