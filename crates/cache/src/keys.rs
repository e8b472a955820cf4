//! The Redis key scheme. Centralized here so the task manager, the
//! resource tracker, and the story engine never hand-format a key
//! inconsistently with each other.

pub fn queue(name: &str) -> String {
    format!("queue:{name}")
}

pub fn tasks_running(queue: &str) -> String {
    format!("tasks:running:{queue}")
}

pub fn task_info(task_id: &str) -> String {
    format!("tasks:info:{task_id}")
}

pub fn tracker_resources(request_id: &str) -> String {
    format!("tracker:{request_id}:resources")
}

/// Engine state fields, persisted under `story:<request_id>:<field>`.
pub mod story {
    pub fn session(request_id: &str) -> String {
        format!("story:{request_id}:session")
    }
    pub fn think(request_id: &str) -> String {
        format!("story:{request_id}:think")
    }
    pub fn script(request_id: &str) -> String {
        format!("story:{request_id}:script")
    }
    pub fn characters(request_id: &str) -> String {
        format!("story:{request_id}:characters")
    }
    pub fn scenes(request_id: &str) -> String {
        format!("story:{request_id}:scenes")
    }
    pub fn voices(request_id: &str) -> String {
        format!("story:{request_id}:voices")
    }
    pub fn storylets(request_id: &str) -> String {
        format!("story:{request_id}:storylets")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn key_shapes() {
        assert_eq!(queue("tts"), "queue:tts");
        assert_eq!(tasks_running("tts"), "tasks:running:tts");
        assert_eq!(task_info("abc"), "tasks:info:abc");
        assert_eq!(tracker_resources("r1"), "tracker:r1:resources");
        assert_eq!(story::script("r1"), "story:r1:script");
    }
}
