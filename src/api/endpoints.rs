//! Backend route table.
//!
//! Paths are relative to the configured API base URL and keep the backend's
//! trailing-slash convention.

// Courses
pub const DEPARTMENTS: &str = "/courses/departments/";
pub const TEACHERS: &str = "/courses/teachers/";
pub const COURSES: &str = "/courses/courses/";
pub const CURRICULA: &str = "/courses/curricula/";
pub const STUDENTS: &str = "/courses/students/";
pub const ENROLLMENTS: &str = "/courses/enrollments/";

// Rooms
pub const BUILDINGS: &str = "/rooms/buildings/";
pub const ROOM_TYPES: &str = "/rooms/room-types/";
pub const ROOMS: &str = "/rooms/rooms/";
pub const ROOM_AVAILABILITY: &str = "/rooms/availability/";
pub const ROOM_BOOKINGS: &str = "/rooms/bookings/";
pub const ROOM_SEARCH: &str = "/rooms/rooms/search_available/";

// Schedules
pub const ACADEMIC_PERIODS: &str = "/schedules/academic-periods/";
pub const TIME_SLOTS: &str = "/schedules/time-slots/";
pub const SCHEDULES: &str = "/schedules/schedules/";
pub const SCHEDULE_SESSIONS: &str = "/schedules/sessions/";
pub const CONFLICTS: &str = "/schedules/conflicts/";
