#[derive(Debug)]
pub struct ApiUrls;

impl ApiUrls {
    // Health
    pub const HEALTH: &'static str = "/health";
    pub const SYSTEM_HEALTH: &'static str = "/system/health";

    // Auth
    pub const LOGIN: &'static str = "/login";
    pub const REGISTER: &'static str = "/register";

    // Chat
    pub const CHAT: &'static str = "/chat";
    pub const CHAT_HISTORY: &'static str = "/chat/history";

    // Client
    pub const CLIENT_DASHBOARD: &'static str = "/client/dashboard";
    pub const CLIENT_TICKETS: &'static str = "/client/tickets";
    pub const CLIENT_TICKET_BY_ID: &'static str = "/client/tickets/:id";
    pub const CLIENT_TICKET_CREATE: &'static str = "/client/tickets/create";

    // Shared tickets
    pub const TICKETS: &'static str = "/tickets";
    pub const TICKETS_ACTIVE: &'static str = "/tickets/active";
    pub const TICKET_BY_ID: &'static str = "/ticket/:id";
    pub const TICKET_REPLY: &'static str = "/ticket/:id/reply";
    pub const TICKET_PRIORITY: &'static str = "/ticket/:id/priority";

    // Admin
    pub const ADMIN_DASHBOARD: &'static str = "/admin/dashboard";
    pub const ADMIN_USERS: &'static str = "/admin/users/all";
    pub const ADMIN_USER_CREATE: &'static str = "/admin/users/create";
    pub const ADMIN_USER_BY_ID: &'static str = "/admin/users/:id";
    pub const ADMIN_USER_ACTIVATE: &'static str = "/admin/users/:id/activate";
    pub const ADMIN_USER_DEACTIVATE: &'static str = "/admin/users/:id/deactivate";
    pub const ADMIN_TICKETS: &'static str = "/admin/tickets/all";
    pub const ADMIN_TICKET_ASSIGN: &'static str = "/admin/tickets/:id/assign";
    pub const ADMIN_DEVELOPER_PERFORMANCE: &'static str = "/admin/developer-performance";
    pub const ADMIN_KNOWLEDGE: &'static str = "/admin/knowledge";
    pub const ADMIN_KNOWLEDGE_BY_INDEX: &'static str = "/admin/knowledge/:index";
    pub const ADMIN_KNOWLEDGE_RELOAD: &'static str = "/admin/knowledge/reload";

    // Project manager
    pub const PM_DASHBOARD: &'static str = "/pm/dashboard";
    pub const PM_UNASSIGNED: &'static str = "/pm/tickets/unassigned";
    pub const PM_TICKET_ASSIGN: &'static str = "/pm/tickets/:id/assign";
    pub const PM_TEAM_MEMBERS: &'static str = "/pm/team/members";
    pub const PM_CREATE_USER: &'static str = "/pm/team/create-user";

    // Developer
    pub const DEV_DASHBOARD: &'static str = "/developer/dashboard";
    pub const DEV_TEAM_MEMBERS: &'static str = "/developer/team/members";
    pub const DEV_MY_ASSIGNED: &'static str = "/developer/tickets/my-assigned";
    pub const DEV_AVAILABLE: &'static str = "/developer/tickets/available";
    pub const DEV_COMPLETED: &'static str = "/developer/tickets/completed";
    pub const DEV_SELF_ASSIGN: &'static str = "/developer/tickets/:id/self-assign";
    pub const DEV_COMPLETE: &'static str = "/developer/tickets/:id/complete";
    pub const DEV_PASS: &'static str = "/developer/tickets/:id/pass";
    pub const DEV_CANCEL: &'static str = "/developer/tickets/:id/cancel";
    pub const DEV_STATUS: &'static str = "/developer/tickets/:id/status";

    // Notifications
    pub const NOTIFICATIONS: &'static str = "/notifications";
    pub const NOTIFICATION_READ: &'static str = "/notifications/:id/read";
    pub const NOTIFICATIONS_READ_ALL: &'static str = "/notifications/read-all";
    pub const NOTIFICATION_BY_ID: &'static str = "/notifications/:id";

    // Settings & analytics
    pub const USER_SETTINGS: &'static str = "/user/settings";
    pub const ANALYTICS: &'static str = "/analytics";
}
