pub mod packet_queue;
pub mod track_local;
pub mod track_remote;
