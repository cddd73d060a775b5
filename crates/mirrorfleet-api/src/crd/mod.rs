mod announcement;
mod file;
mod job;
mod manager;

pub use announcement::{Announcement, AnnouncementSpec, AnnouncementStatus};
pub use file::{File, FileInfo, FileSpec, FileStatus, FileType};
pub use job::{
    IngressConfig, Job, JobConfig, JobDeploy, JobSpec, JobStatus, MirrorType, SyncStatus,
    VolumeConfig,
};
pub use manager::{DeployConfig, DeployPhase, DeployType, Manager, ManagerSpec, ManagerStatus};
